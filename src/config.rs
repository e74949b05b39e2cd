//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fpanalyzer.toml` files.

use crate::models::FunctionSet;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working and input directories.
pub const CONFIG_FILE_NAME: &str = ".fpanalyzer.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Input discovery settings.
    #[serde(default)]
    pub input: InputConfig,

    /// Consistency detection settings.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Output document locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Where per-host result files are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory holding `fingerprint_results_<id>.csv` / `system_info_<id>.txt` pairs.
    #[serde(default = "default_input_dir")]
    pub directory: PathBuf,

    /// Descend into subdirectories.
    #[serde(default)]
    pub recursive: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: default_input_dir(),
            recursive: false,
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("fingerprint_results")
}

/// Consistency detection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Tracked function set used when reading hosts.
    #[serde(default)]
    pub function_set: FunctionSet,

    /// Compare `<function>_elapsed` fields too. Timings almost always
    /// differ between hosts, so this is off by default.
    #[serde(default)]
    pub include_elapsed: bool,
}

/// Output document locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Unified dataset document.
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,

    /// Host metadata document.
    #[serde(default = "default_hosts")]
    pub hosts: PathBuf,

    /// Disagreement report document.
    #[serde(default = "default_disagreements")]
    pub disagreements: PathBuf,

    /// Optional Markdown summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<PathBuf>,

    /// Disagreements listed in detail in the Markdown summary.
    #[serde(default = "default_summary_limit")]
    pub summary_limit: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            hosts: default_hosts(),
            disagreements: default_disagreements(),
            summary: None,
            summary_limit: default_summary_limit(),
        }
    }
}

fn default_dataset() -> PathBuf {
    PathBuf::from("aggregate_fingerprint_data.json")
}

fn default_hosts() -> PathBuf {
    PathBuf::from("aggregate_system_data.json")
}

fn default_disagreements() -> PathBuf {
    PathBuf::from("inconsistent_rows.json")
}

fn default_summary_limit() -> usize {
    50
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a directory (e.g. the input directory).
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings and only
    /// override when explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref input) = args.input {
            self.input.directory = input.clone();
        }
        if args.recursive {
            self.input.recursive = true;
        }

        if let Some(function_set) = args.function_set {
            self.detection.function_set = function_set;
        }
        if args.include_elapsed {
            self.detection.include_elapsed = true;
        }

        if let Some(ref dataset) = args.dataset {
            self.output.dataset = dataset.clone();
        }
        if let Some(ref hosts) = args.hosts {
            self.output.hosts = hosts.clone();
        }
        if let Some(ref report) = args.report {
            self.output.disagreements = report.clone();
        }
        if let Some(ref summary) = args.summary {
            self.output.summary = Some(summary.clone());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
