use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::locator::{self, LocatorProfile};
use crate::metadata::{self, ImageHandle};
use crate::substitute;

/// Container formats the reader understands, determined by file extension.
///
/// # Example
///
/// ```rust
/// use workflow_swap::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("render.PNG")), Some(ImageKind::Png));
/// assert_eq!(ImageKind::from_path(Path::new("render.jpg")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("render.webp")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// PNG: text chunks, read and write
    Png,
    /// JPEG: COM segments and EXIF strings, read only
    Jpeg,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// The two batch pipelines.
///
/// - `Embed` rewrites the workflow inside each PNG and saves a new
///   `<stem>_modified_<timestamp>.png`.
/// - `Extract` writes the (substituted) workflow of each PNG/JPEG to `<stem>.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RunMode {
    #[default]
    Embed,
    Extract,
}

impl RunMode {
    /// File extensions (lowercase) the scanner accepts for this mode.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Embed => &["png"],
            Self::Extract => &["png", "jpg", "jpeg"],
        }
    }

    pub fn locator_profile(self) -> LocatorProfile {
        match self {
            Self::Embed => LocatorProfile::EMBED,
            Self::Extract => LocatorProfile::EXTRACT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Embed => "embed",
            Self::Extract => "extract",
        }
    }
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Output written to this path.
    Written(PathBuf),
    /// Dry run: output would have been written to this path.
    WouldWrite(PathBuf),
    /// No recognised metadata field held workflow JSON.
    NoWorkflow { available: Vec<String> },
    /// Workflow found, but none of the rules' text occurs in it.
    NoMatch,
    /// The file disappeared between listing and opening.
    Missing,
    /// Any other per-file failure.
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written(_) => "written",
            Self::WouldWrite(_) => "would_write",
            Self::NoWorkflow { .. } => "no_workflow",
            Self::NoMatch => "no_match",
            Self::Missing => "missing",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Missing)
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Written(p) | Self::WouldWrite(p) => Some(p.as_path()),
            _ => None,
        }
    }
}

/// The result of processing a single image.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// Metadata field the workflow was found in.
    pub field: Option<String>,
    /// Number of replacements made.
    pub replacements: usize,
    pub outcome: Outcome,
}

/// Totals for a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ProcessResult>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn written(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.output_path().is_some())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.total() - self.written() - self.failed()
    }
}

/// List the images in `dir` that `mode` handles.
///
/// Only direct entries are considered (no recursion). Extensions are matched
/// case-insensitively. Paths are absolute and sorted by file name. A missing
/// directory is an error.
///
/// # Example
///
/// ```rust,no_run
/// use workflow_swap::pipeline::{collect_images, RunMode};
/// use std::path::Path;
///
/// let images = collect_images(Path::new("./renders"), RunMode::Extract).unwrap();
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(dir: &Path, mode: RunMode) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Source directory '{}' does not exist", dir.display());
    }
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    let mut images = Vec::new();
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };
        let p = entry.path();
        if p.is_file() && has_extension(p, mode.extensions()) {
            images.push(p.to_path_buf());
        }
    }

    Ok(images)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Run one pipeline over every matching image in `config.input_dir`.
///
/// Only a missing input directory (or an invalid config) aborts the run; every
/// per-file problem is recorded in the returned summary and the batch moves on.
///
/// # Example
///
/// ```rust,no_run
/// use workflow_swap::config::Config;
/// use workflow_swap::pipeline::{run, RunMode};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::load(Some("config.json".as_ref()))?;
/// let summary = run(&config, RunMode::Extract)?;
/// println!("{} written, {} skipped", summary.written(), summary.skipped());
/// # Ok(())
/// # }
/// ```
pub fn run(config: &Config, mode: RunMode) -> Result<RunSummary> {
    config.validate()?;
    if mode == RunMode::Embed && config.rules.is_empty() {
        anyhow::bail!("No replacement rules configured; embed has nothing to change");
    }

    log::info!("Looking for images in: {}", config.input_dir.display());
    for rule in &config.rules {
        log::info!("Replacing '{}' with '{}'", rule.old, rule.new);
    }

    let images = collect_images(&config.input_dir, mode)?;
    if images.is_empty() {
        log::info!(
            "No {} files found in '{}'",
            mode.extensions().join("/"),
            config.input_dir.display()
        );
        return Ok(RunSummary::default());
    }

    if config.output.dry_run {
        log::info!("DRY RUN, no files will be written");
    } else if !config.output_dir.exists() {
        log::info!("Creating output directory: {}", config.output_dir.display());
        std::fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to create output directory {}", config.output_dir.display())
        })?;
    }

    let mut summary = RunSummary::default();
    let mut claimed = HashSet::new();
    let total = images.len();
    for (i, path) in images.iter().enumerate() {
        log::info!("[{}/{}] Processing: {}", i + 1, total, file_label(path));
        summary
            .results
            .push(process_claiming(path, mode, config, &mut claimed));
    }

    Ok(summary)
}

/// Process a single image with the given pipeline.
///
/// Never fails: problems are reported through [`ProcessResult::outcome`].
pub fn process_image(path: &Path, mode: RunMode, config: &Config) -> ProcessResult {
    process_claiming(path, mode, config, &mut HashSet::new())
}

/// `claimed` holds the destinations already produced in this run; a file whose
/// usual destination is taken falls back to a name built from its full file name.
fn process_claiming(
    path: &Path,
    mode: RunMode,
    config: &Config,
    claimed: &mut HashSet<PathBuf>,
) -> ProcessResult {
    let mut result = ProcessResult {
        path: path.to_path_buf(),
        field: None,
        replacements: 0,
        outcome: Outcome::Missing,
    };

    if !path.exists() {
        log::error!("File not found at {}", path.display());
        return result;
    }

    match try_process(path, mode, config, claimed, &mut result) {
        Ok(outcome) => result.outcome = outcome,
        Err(e) => {
            log::error!("Error while processing {}: {e:#}", file_label(path));
            result.outcome = Outcome::Failed(format!("{e:#}"));
        }
    }

    result
}

fn try_process(
    path: &Path,
    mode: RunMode,
    config: &Config,
    claimed: &mut HashSet<PathBuf>,
    result: &mut ProcessResult,
) -> Result<Outcome> {
    let label = file_label(path);
    let handle = metadata::read_image(path)?;

    let Some(mut located) = locator::locate(handle.metadata(), &mode.locator_profile(), &label)
    else {
        let available = handle.metadata().names();
        log::warn!(
            "Workflow JSON cannot be found or parsed for {label}. Available fields: [{}]",
            available.join(", ")
        );
        return Ok(Outcome::NoWorkflow { available });
    };
    result.field = Some(located.field.clone());

    if mode == RunMode::Embed
        && !substitute::mentions_any(&located.document, &config.rules, config.substitution)?
    {
        log::info!("Replacement text not found in the workflow JSON for {label}. Skipping.");
        return Ok(Outcome::NoMatch);
    }

    let replacements =
        substitute::apply(&mut located.document, &config.rules, config.substitution)?;
    result.replacements = replacements;
    log::info!("Made {replacements} replacement(s) in '{}'", located.field);

    match mode {
        RunMode::Embed => embed(&handle, &located, config, claimed),
        RunMode::Extract => extract(path, &located.document, config, claimed),
    }
}

fn embed(
    handle: &ImageHandle,
    located: &locator::Located,
    config: &Config,
    claimed: &mut HashSet<PathBuf>,
) -> Result<Outcome> {
    let text = located.field_text(&located.document)?;
    let bytes = metadata::embed_field(handle, &located.field, &text)?;

    let timestamp = metadata::unix_timestamp();
    let dest = unclaimed_destination(
        config.output_dir.join(metadata::modified_file_name(&file_stem(handle.path()), timestamp)),
        config.output_dir.join(metadata::modified_file_name(&file_label(handle.path()), timestamp)),
        claimed,
    );

    if config.output.dry_run {
        log::info!("Would save to: {}", dest.display());
        claimed.insert(dest.clone());
        return Ok(Outcome::WouldWrite(dest));
    }

    std::fs::write(&dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;
    claimed.insert(dest.clone());
    log::info!("Updated '{}' and saved to: {}", located.field, dest.display());
    Ok(Outcome::Written(dest))
}

fn extract(
    path: &Path,
    document: &serde_json::Value,
    config: &Config,
    claimed: &mut HashSet<PathBuf>,
) -> Result<Outcome> {
    let dest = unclaimed_destination(
        config.output_dir.join(metadata::json_file_name(&file_stem(path))),
        config.output_dir.join(metadata::json_file_name(&file_label(path))),
        claimed,
    );

    if config.output.dry_run {
        log::info!("Would extract to: {}", dest.display());
        claimed.insert(dest.clone());
        return Ok(Outcome::WouldWrite(dest));
    }

    metadata::write_json(&dest, document, config.output.pretty_json)?;
    claimed.insert(dest.clone());
    log::info!("Extracted workflow JSON to: {}", dest.display());
    Ok(Outcome::Written(dest))
}

fn unclaimed_destination(dest: PathBuf, fallback: PathBuf, claimed: &HashSet<PathBuf>) -> PathBuf {
    if !claimed.contains(&dest) {
        return dest;
    }
    log::warn!(
        "{} was already written in this run; using {} instead",
        dest.display(),
        fallback.display()
    );
    fallback
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
