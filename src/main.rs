//! fpanalyzer - Cross-host floating-point fingerprint analyzer
//!
//! A CLI tool that aggregates per-host fingerprint result files into a
//! unified dataset and reports every sample index where hosts recorded
//! different values.
//!
//! Exit codes:
//!   0 - Success (no disagreements, or no --fail-on-disagreement set)
//!   1 - Runtime error (unreadable input, integrity violation, I/O, etc.)
//!   2 - Disagreements found and --fail-on-disagreement set

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod reader;
mod report;
mod scanner;

use analysis::{detect, Admission, Aggregator, DetectorOptions};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use models::{HostCatalog, SkippedHost, UnifiedDataset};
use report::{DisagreementReport, RunMetadata, SummaryInput};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is loaded before logging so it can raise the log level
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose))?;

    info!("fpanalyzer v{}", env!("CARGO_PKG_VERSION"));
    match source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);
    debug!("Effective config: {:?}", config);

    match run(args, config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .fpanalyzer.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to change the input directory, function set and output paths.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// How a run treats persisted documents and the terminal.
#[derive(Debug, Clone, Copy, Default)]
struct RunOptions {
    append: bool,
    analyze_only: bool,
    quiet: bool,
}

impl From<&Args> for RunOptions {
    fn from(args: &Args) -> Self {
        Self {
            append: args.append,
            analyze_only: args.analyze_only,
            quiet: args.quiet,
        }
    }
}

/// What a run produced.
#[derive(Debug)]
struct RunOutcome {
    hosts: usize,
    skipped: usize,
    indices: usize,
    disagreements: usize,
    indices_affected: usize,
    duration_seconds: f64,
}

/// Hosts merged during ingestion.
struct Ingestion {
    dataset: UnifiedDataset,
    catalog: HostCatalog,
    skipped: Vec<SkippedHost>,
    added: usize,
    duplicates: usize,
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
fn run(args: Args, config: Config) -> Result<i32> {
    // Handle --dry-run: scan files and exit
    if args.dry_run {
        return handle_dry_run(&config);
    }

    let outcome = execute(&config, RunOptions::from(&args))?;

    // Print summary
    println!("\n📊 Analysis Summary:");
    println!("   Hosts aggregated: {}", outcome.hosts);
    if outcome.skipped > 0 {
        println!("   ⚠️  Hosts skipped: {}", outcome.skipped);
    }
    println!("   Sample indices: {}", outcome.indices);
    println!(
        "   Disagreements: {} across {} indices",
        outcome.disagreements, outcome.indices_affected
    );
    println!("   Duration: {:.1}s", outcome.duration_seconds);
    println!(
        "\n✅ Analysis complete! Disagreements saved to: {}",
        config.output.disagreements.display()
    );

    if args.fail_on_disagreement && outcome.disagreements > 0 {
        eprintln!(
            "\n⛔ {} disagreements found. Failing (exit code 2).",
            outcome.disagreements
        );
        return Ok(2);
    }

    Ok(0)
}

/// Ingest (or reload), persist, detect and report.
fn execute(config: &Config, options: RunOptions) -> Result<RunOutcome> {
    let start_time = Instant::now();
    let started_at = Utc::now();

    let ingestion = if options.analyze_only {
        reload(config)?
    } else {
        let ingestion = ingest(config, options)?;

        report::save_dataset(&config.output.dataset, &ingestion.dataset)?;
        report::save_hosts(&config.output.hosts, &ingestion.catalog)?;
        ingestion
    };

    // Step 3: Detect disagreements
    if !options.quiet {
        println!("\n🔬 Comparing hosts...");
    }

    let function_set = ingestion.dataset.function_set();
    let detector_options = DetectorOptions {
        include_elapsed: config.detection.include_elapsed,
    };
    let records = detect(&ingestion.dataset, &ingestion.catalog, detector_options)
        .context("Dataset failed integrity checks")?;
    let disagreement_report =
        DisagreementReport::new(function_set, detector_options.include_elapsed, records);

    report::save_report(&config.output.disagreements, &disagreement_report)?;

    let duration = start_time.elapsed().as_secs_f64();

    // Step 4: Optional Markdown summary
    if let Some(ref summary_path) = config.output.summary {
        let run = RunMetadata {
            input: config.input.directory.clone(),
            started_at,
            hosts_added: ingestion.added,
            duplicates: ingestion.duplicates,
            duration_seconds: duration,
        };
        let markdown = report::generate_markdown_summary(&SummaryInput {
            run: &run,
            dataset: &ingestion.dataset,
            catalog: &ingestion.catalog,
            report: &disagreement_report,
            skipped: &ingestion.skipped,
            limit: config.output.summary_limit,
        });
        report::save_text(summary_path, &markdown)?;
        info!("Wrote summary to {}", summary_path.display());
    }

    Ok(RunOutcome {
        hosts: ingestion.catalog.len(),
        skipped: ingestion.skipped.len(),
        indices: ingestion.dataset.index_count(),
        disagreements: disagreement_report.summary.total,
        indices_affected: disagreement_report.summary.indices_affected,
        duration_seconds: duration,
    })
}

/// Scan the input directory and aggregate every readable host.
fn ingest(config: &Config, options: RunOptions) -> Result<Ingestion> {
    let input = &config.input.directory;
    let function_set = config.detection.function_set;

    // Step 1: Discover host files
    if !options.quiet {
        println!("📂 Scanning {}", input.display());
    }

    let scan_config = scanner::ScanConfig::from(&config.input);
    let outcome = scanner::FileScanner::new(input.clone(), scan_config)
        .scan()
        .with_context(|| format!("Failed to scan input directory {}", input.display()))?;

    let mut skipped: Vec<SkippedHost> = Vec::new();
    for orphan in outcome.orphans {
        let err = orphan.into_error();
        warn!("Skipping {}", err);
        skipped.push(SkippedHost {
            source: err.file.clone(),
            reason: err.kind.to_string(),
        });
    }

    let mut aggregator = if options.append && config.output.dataset.exists() {
        let dataset = report::load_dataset(&config.output.dataset).with_context(|| {
            format!("Failed to load dataset {}", config.output.dataset.display())
        })?;
        let catalog = report::load_hosts(&config.output.hosts).with_context(|| {
            format!("Failed to load hosts {}", config.output.hosts.display())
        })?;
        Aggregator::resume(dataset, catalog, function_set)
            .context("Existing dataset cannot be extended")?
    } else {
        if options.append {
            info!(
                "No dataset at {}, starting a new one",
                config.output.dataset.display()
            );
        }
        Aggregator::new(function_set)
    };

    // Step 2: Read and aggregate each host
    if !options.quiet {
        println!("📥 Reading {} hosts...", outcome.hosts.len());
    }

    let progress = if options.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(outcome.hosts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    let mut added = 0;
    let mut duplicates = 0;

    for files in &outcome.hosts {
        progress.set_message(files.host_id.to_string());

        match reader::read_host(files, function_set) {
            Ok(host) => {
                let host_id = host.host_id().clone();
                match aggregator
                    .add_host(host)
                    .with_context(|| format!("Failed to aggregate host {}", host_id))?
                {
                    Admission::Added { samples } => {
                        debug!("Host {}: {} samples", host_id, samples);
                        added += 1;
                    }
                    Admission::Duplicate => duplicates += 1,
                }
            }
            Err(e) => {
                warn!("Skipping host {}: {}", files.host_id, e);
                skipped.push(SkippedHost {
                    source: e.file.clone(),
                    reason: e.kind.to_string(),
                });
            }
        }

        progress.inc(1);
    }
    progress.finish_and_clear();

    let (dataset, catalog) = aggregator.finish();

    if catalog.is_empty() {
        bail!(
            "No hosts could be aggregated from {} ({} skipped)",
            input.display(),
            skipped.len()
        );
    }

    info!(
        "Aggregated {} hosts ({} new, {} duplicates, {} skipped)",
        catalog.len(),
        added,
        duplicates,
        skipped.len()
    );

    Ok(Ingestion {
        dataset,
        catalog,
        skipped,
        added,
        duplicates,
    })
}

/// Reload the persisted dataset and hosts for --analyze-only.
fn reload(config: &Config) -> Result<Ingestion> {
    let dataset = report::load_dataset(&config.output.dataset)
        .with_context(|| format!("Failed to load dataset {}", config.output.dataset.display()))?;
    let catalog = report::load_hosts(&config.output.hosts)
        .with_context(|| format!("Failed to load hosts {}", config.output.hosts.display()))?;

    info!(
        "Loaded {} hosts over {} sample indices (function set {})",
        catalog.len(),
        dataset.index_count(),
        dataset.function_set()
    );

    Ok(Ingestion {
        dataset,
        catalog,
        skipped: Vec::new(),
        added: 0,
        duplicates: 0,
    })
}

/// Handle --dry-run: scan files, print what would be read, exit.
fn handle_dry_run(config: &Config) -> Result<i32> {
    let input = &config.input.directory;
    println!("\n🔍 Dry run: scanning {} (no files are read)...\n", input.display());

    let outcome = scanner::FileScanner::new(input.clone(), scanner::ScanConfig::from(&config.input))
        .scan()
        .with_context(|| format!("Failed to scan input directory {}", input.display()))?;

    if outcome.hosts.is_empty() {
        println!("   No host file pairs found.");
    } else {
        println!("   Found {} hosts that would be read:\n", outcome.hosts.len());
        for host in &outcome.hosts {
            println!(
                "     📄 {} ({} + {})",
                host.host_id,
                host.samples.display(),
                host.metadata.display()
            );
        }
    }

    if !outcome.orphans.is_empty() {
        println!("\n   {} files would be skipped:\n", outcome.orphans.len());
        for orphan in outcome.orphans {
            println!("     ⚠️  {}", orphan.into_error());
        }
    }

    println!("\n✅ Dry run complete. Nothing was written.");
    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Looks at --config, then the working directory, then the input directory.
/// Returns the file the configuration came from, if any. Runs before logging
/// is set up, so problems are reported on stderr.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    // Try default location, then the input directory
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| Config::default().input.directory);
    let found = Config::load_default()
        .map(|config| config.map(|c| (c, PathBuf::from(CONFIG_FILE_NAME))))
        .and_then(|found| match found {
            Some(found) => Ok(Some(found)),
            None => Config::load_from_dir(&input)
                .map(|config| config.map(|c| (c, input.join(CONFIG_FILE_NAME)))),
        });

    match found {
        Ok(Some((config, path))) => Ok((config, Some(path))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("⚠️  Failed to load config, using defaults: {:#}", e);
            Ok((Config::default(), None))
        }
    }
}
