//! # workflow-swap
//!
//! Batch text substitution for the workflow JSON that node-based image
//! generation tools embed in PNG (and JPEG) metadata.
//!
//! ## Quick Start
//!
//! The simplest way to use the library is through the pipeline module, which
//! handles the full scan → locate → substitute → write flow:
//!
//! ```rust,no_run
//! use workflow_swap::config::{Config, ReplacementRule};
//! use workflow_swap::pipeline::{run, RunMode};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.input_dir = "./renders".into();
//!     config.output_dir = "./renders/out".into();
//!     config.rules = vec![ReplacementRule::new("toki (blue archive)", "rio (blue archive)")];
//!
//!     // Save modified copies of every PNG
//!     let summary = run(&config, RunMode::Embed)?;
//!     println!("{} written, {} skipped", summary.written(), summary.skipped());
//!
//!     // Or dump each workflow to <stem>.json
//!     run(&config, RunMode::Extract)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! ```rust,no_run
//! use workflow_swap::config::{ReplacementRule, SubstitutionMode};
//! use workflow_swap::locator::{locate, LocatorProfile};
//! use workflow_swap::metadata::{embed_field, read_image};
//! use workflow_swap::substitute;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let handle = read_image(Path::new("render.png"))?;
//!     let Some(mut found) = locate(handle.metadata(), &LocatorProfile::EMBED, "render.png") else {
//!         println!("no workflow in: {:?}", handle.metadata().names());
//!         return Ok(());
//!     };
//!
//!     let rules = [ReplacementRule::new("cat", "dog")];
//!     let n = substitute::apply(&mut found.document, &rules, SubstitutionMode::Structural)?;
//!     println!("{n} replacement(s) in '{}'", found.field);
//!
//!     let png = embed_field(&handle, &found.field, &found.field_text(&found.document)?)?;
//!     std::fs::write("render_modified.png", png)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Where the workflow is looked for
//!
//! | Pipeline | Fields, in order |
//! |----------|------------------|
//! | embed (PNG) | `prompt`, `workflow`, then `tEXt`/`zTXt` fields holding a workflow |
//! | extract (PNG, JPEG) | `prompt`, `workflow`, `parameters` |
//!
//! ## Modules
//!
//! - [`config`]: Configuration types and loading/saving
//! - [`metadata`]: PNG/JPEG text metadata reading and PNG re-embedding
//! - [`locator`]: Priority search for the workflow field
//! - [`substitute`]: Structural and coarse text substitution
//! - [`pipeline`]: Directory scanning and the two batch pipelines

pub mod config;
pub mod locator;
pub mod metadata;
pub mod pipeline;
pub mod substitute;

#[cfg(test)]
mod test_support;
