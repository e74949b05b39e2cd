//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::FunctionSet;
use clap::Parser;
use std::path::PathBuf;

/// fpanalyzer - cross-host floating-point fingerprint analyzer
///
/// Aggregates per-host fingerprint results into one dataset and reports
/// every sample index where hosts recorded different values.
///
/// Examples:
///   fpanalyzer --input fingerprint_results
///   fpanalyzer --input new_hosts --append
///   fpanalyzer --analyze-only --include-elapsed --summary summary.md
///   fpanalyzer --input fingerprint_results --dry-run
///   fpanalyzer --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory holding fingerprint_results_<id>.csv / system_info_<id>.txt pairs
    ///
    /// Defaults to the configured input directory (fingerprint_results).
    #[arg(short, long, value_name = "DIR")]
    pub input: Option<PathBuf>,

    /// Search the input directory recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Unified dataset document to write (or read with --append / --analyze-only)
    #[arg(long, value_name = "FILE")]
    pub dataset: Option<PathBuf>,

    /// Host metadata document to write (or read with --append / --analyze-only)
    #[arg(long, value_name = "FILE")]
    pub hosts: Option<PathBuf>,

    /// Disagreement report document to write
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Also write a Markdown summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .fpanalyzer.toml in the current directory,
    /// then in the input directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Tracked function set (v1: sin, cos, e, log; v2: adds cosh, tan)
    #[arg(long, value_name = "SET")]
    pub function_set: Option<FunctionSet>,

    /// Compare <function>_elapsed fields as well as values
    #[arg(long)]
    pub include_elapsed: bool,

    /// Add the input hosts to the existing dataset instead of replacing it
    #[arg(long, conflicts_with = "analyze_only")]
    pub append: bool,

    /// Skip ingestion: reload the persisted dataset and hosts, then detect
    #[arg(long)]
    pub analyze_only: bool,

    /// Dry run: list discovered host file pairs without reading them
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 2 when any disagreement is found
    ///
    /// Useful for CI pipelines.
    #[arg(long)]
    pub fail_on_disagreement: bool,

    /// Generate a default .fpanalyzer.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.append && self.analyze_only {
            return Err("Cannot use both --append and --analyze-only".to_string());
        }

        if self.analyze_only && self.dry_run {
            return Err("--dry-run has nothing to list with --analyze-only".to_string());
        }

        // Validate input directory if provided
        if !self.analyze_only {
            if let Some(ref input) = self.input {
                if !input.exists() {
                    return Err(format!(
                        "Input directory does not exist: {}",
                        input.display()
                    ));
                }
                if !input.is_dir() {
                    return Err(format!(
                        "Input path is not a directory: {}",
                        input.display()
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `[general] verbose` setting; `--quiet` wins.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
pub(crate) fn make_args() -> Args {
    Args {
        input: None,
        recursive: false,
        dataset: None,
        hosts: None,
        report: None,
        summary: None,
        config: None,
        verbose: false,
        quiet: false,
        function_set: None,
        include_elapsed: false,
        append: false,
        analyze_only: false,
        dry_run: false,
        fail_on_disagreement: false,
        init_config: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "fpanalyzer",
            "-i",
            "results",
            "--function-set",
            "v1",
            "--include-elapsed",
            "--report",
            "diffs.json",
            "--fail-on-disagreement",
        ])
        .unwrap();

        assert_eq!(args.input, Some(PathBuf::from("results")));
        assert_eq!(args.function_set, Some(FunctionSet::V1));
        assert!(args.include_elapsed);
        assert_eq!(args.report, Some(PathBuf::from("diffs.json")));
        assert!(args.fail_on_disagreement);
        assert!(!args.append);
    }

    #[test]
    fn test_append_conflicts_with_analyze_only() {
        assert!(Args::try_parse_from(["fpanalyzer", "--append", "--analyze-only"]).is_err());

        let mut args = make_args();
        args.append = true;
        args.analyze_only = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = make_args();

        args.input = Some(dir.path().to_path_buf());
        assert!(args.validate().is_ok());

        args.input = Some(dir.path().join("missing"));
        assert!(args.validate().is_err());

        // The input is never read when only analyzing.
        args.analyze_only = true;
        assert!(args.validate().is_ok());

        let file = dir.path().join("not_a_dir.txt");
        std::fs::write(&file, "x").unwrap();
        args.analyze_only = false;
        args.input = Some(file);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_args_override_config() {
        let mut config: Config = toml::from_str(
            "[detection]\nfunction_set = \"v1\"\n[output]\ndisagreements = \"a.json\"\n",
        )
        .unwrap();

        let mut args = make_args();
        args.function_set = Some(FunctionSet::V2);
        args.summary = Some(PathBuf::from("summary.md"));
        config.merge_with_args(&args);

        assert_eq!(config.detection.function_set, FunctionSet::V2);
        assert_eq!(config.output.disagreements, PathBuf::from("a.json"));
        assert_eq!(config.output.summary, Some(PathBuf::from("summary.md")));
        assert!(!config.detection.include_elapsed);
    }
}
