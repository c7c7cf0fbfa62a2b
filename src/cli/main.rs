use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use workflow_swap::config;
use workflow_swap::pipeline::{self, Outcome, RunMode};

#[derive(Parser, Debug)]
#[command(
    name = "workflow-swap",
    version,
    about = "Rewrite text inside the workflow JSON embedded in PNG/JPEG metadata"
)]
struct Cli {
    /// Pipeline to run: `embed` saves modified PNG copies, `extract` writes <stem>.json files
    #[arg(value_enum, default_value_t = RunMode::Embed)]
    mode: RunMode,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Run every stage but write no files
    #[arg(long)]
    dry_run: bool,

    /// Output per-file results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    // Load config
    let mut config = config::Config::load(cli.config.as_deref())?;

    // Override dry_run from CLI flag
    if cli.dry_run {
        config.output.dry_run = true;
    }

    log::info!("--- Starting workflow {} ---", cli.mode.name());
    let summary = pipeline::run(&config, cli.mode)?;

    // JSON output
    if cli.json {
        let json_results: Vec<serde_json::Value> = summary
            .results
            .iter()
            .map(|r| {
                let (available, error) = match &r.outcome {
                    Outcome::NoWorkflow { available } => (Some(available.clone()), None),
                    Outcome::Failed(e) => (None, Some(e.clone())),
                    _ => (None, None),
                };
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "outcome": r.outcome.label(),
                    "field": r.field,
                    "replacements": r.replacements,
                    "output": r.outcome.output_path().map(|p| p.display().to_string()),
                    "available_fields": available,
                    "error": error,
                })
            })
            .collect();

        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    // Summary
    log::info!(
        "Done: {} written, {} skipped, {} failed out of {} images",
        summary.written(),
        summary.skipped(),
        summary.failed(),
        summary.total()
    );

    Ok(())
}
