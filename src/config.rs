use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a workflow-swap run.
///
/// Holds the input and output directories, the ordered replacement rules,
/// which substitution engine to use, and output behavior (dry run, JSON
/// formatting).
///
/// # Loading
///
/// ```rust,no_run
/// use workflow_swap::config::{Config, ReplacementRule};
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.input_dir = "./renders".into();
/// config.rules = vec![ReplacementRule::new("cat", "dog")];
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned for input images (not recursive).
    pub input_dir: PathBuf,
    /// Directory receiving modified images or extracted JSON. May equal `input_dir`.
    pub output_dir: PathBuf,
    /// Replacement rules, applied in order.
    pub rules: Vec<ReplacementRule>,
    /// How the rules are applied to the workflow document.
    pub substitution: SubstitutionMode,
    /// Output behavior.
    pub output: OutputConfig,
}

/// A literal, case-sensitive substring replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
    pub old: String,
    pub new: String,
}

impl ReplacementRule {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Which substitution engine to run.
///
/// - `Structural` rewrites only string leaves of the parsed JSON tree.
/// - `Coarse` rewrites the serialized JSON text and re-parses it; keys and
///   escaped text are matched too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionMode {
    #[default]
    Structural,
    Coarse,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// If `true`, run every stage but write no files.
    pub dry_run: bool,
    /// If `true`, extracted `.json` files are indented.
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            pretty_json: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("output"),
            rules: vec![ReplacementRule::new(
                "toki (blue archive)",
                "rio (blue archive)",
            )],
            substitution: SubstitutionMode::Structural,
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the config file path (same directory as the executable).
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject rules that cannot be applied.
    ///
    /// An empty rule list is valid here: extraction without substitution is a
    /// normal run. The embed pipeline checks for rules itself.
    pub fn validate(&self) -> Result<()> {
        if let Some(pos) = self.rules.iter().position(|r| r.old.is_empty()) {
            anyhow::bail!("Replacement rule #{} has an empty `old` text", pos + 1);
        }
        Ok(())
    }
}
