mod display;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dialoguer::Confirm;
use fimint::config::{AppConfig, ExtractorKind, default_config_path};
use fimint::services::batch::Analysis;
use fimint::services::export::{ExportService, HISTORY_FILE};
use fimint::services::BuiltinExifExtractor;
use fimint::{BatchAnalyzer, WeightingSystem};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "fimint",
    version,
    about = "Compare the metadata of a batch of files"
)]
struct Cli {
    /// More log output (repeat for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file (default: <config dir>/fimint/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash, extract and compare every file of a ZIP archive or directory
    Analyze {
        /// ZIP archive or directory
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Custom weights, e.g. "Author:3,PDF:Producer:2"
        #[arg(long, value_name = "K:W,...")]
        weights: Option<String>,

        /// Weighting system to apply (repeatable; default from config)
        #[arg(long = "system", value_name = "SYSTEM")]
        systems: Vec<WeightingSystem>,

        /// Directory for CSV, GeoJSON and history output
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out: PathBuf,

        /// Overwrite existing exports without asking
        #[arg(long)]
        force: bool,

        /// Skip writing export files
        #[arg(long)]
        no_export: bool,

        /// Skip the similarity chart
        #[arg(long)]
        no_chart: bool,

        /// Metadata extractor to use
        #[arg(long, value_enum)]
        extractor: Option<ExtractorKind>,
    },

    /// Show the hash and normalized metadata of one file
    Inspect {
        /// ZIP archive or directory
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Name of the file at the root of the input
        #[arg(value_name = "FILE_NAME")]
        file_name: String,

        /// Metadata extractor to use
        #[arg(long, value_enum)]
        extractor: Option<ExtractorKind>,
    },

    /// List files with identical content
    Duplicates {
        /// ZIP archive or directory
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// List previous analyze runs recorded in an output directory
    History {
        /// Output directory used by `analyze`
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze {
            input,
            weights,
            systems,
            out,
            force,
            no_export,
            no_chart,
            extractor,
        } => {
            if let Some(kind) = extractor {
                config.extractor.kind = kind;
            }
            let analyzer = BatchAnalyzer::from_config(config)?.with_progress(!cli.quiet);

            println!("▶ Analyzing {}", input.display());
            let analysis = benchmark("analysis", || {
                analyzer.analyze(&input, &systems, weights.as_deref().unwrap_or(""))
            })
            .with_context(|| format!("Failed to analyze {}", input.display()))?;

            print_analysis(&analysis, !no_chart);

            if no_export {
                return Ok(());
            }
            export(&input, &analysis, &out, force)?;
        }

        Commands::Inspect {
            input,
            file_name,
            extractor,
        } => {
            if let Some(kind) = extractor {
                config.extractor.kind = kind;
            }
            let analyzer = BatchAnalyzer::from_config(config)?;
            match analyzer
                .inspect(&input, &file_name)
                .with_context(|| format!("Failed to read {}", input.display()))?
            {
                Some(record) => display::print_record(&record),
                None => anyhow::bail!(
                    "No file named {} at the top level of {}",
                    file_name,
                    input.display()
                ),
            }
        }

        Commands::Duplicates { input } => {
            println!("▶ Hashing files in: {}", input.display());
            let analyzer = BatchAnalyzer::new(config, Box::new(BuiltinExifExtractor::new()));
            let summary = benchmark("hashing", || analyzer.hash_only(&input))
                .with_context(|| format!("Failed to hash {}", input.display()))?;

            println!("Hashed {} file(s).", summary.files.len());
            if summary.duplicates.is_empty() {
                println!("No duplicates found.");
            }
            for (first, second) in &summary.duplicates {
                print_duplicate_warning(first, second);
            }
        }

        Commands::History { out } => {
            let exporter = ExportService::new(&out);
            let records = exporter
                .read_history()
                .with_context(|| format!("Could not read history in {}", out.display()))?;

            println!("🗂️  Analysis History:");
            for (i, rec) in records.iter().enumerate() {
                println!(
                    "[{}] {}\n     source: {}\n     files: {}, duplicate pairs: {}, comparisons: {}\n     exported: {:?}\n",
                    i,
                    rec.timestamp,
                    rec.source,
                    rec.files,
                    rec.duplicate_pairs,
                    rec.comparisons,
                    rec.exported
                );
            }
        }

        Commands::Config => {
            match (&cli.config, default_config_path()) {
                (Some(path), _) => println!("# loaded from {}", path.display()),
                (None, Some(path)) if path.is_file() => {
                    println!("# loaded from {}", path.display())
                }
                (None, Some(path)) => println!("# defaults (no file at {})", path.display()),
                (None, None) => println!("# defaults"),
            }
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_duplicate_warning(first: &str, second: &str) {
    println!(
        "⚠️  Attention: the files {} and {} have the same hash value",
        first, second
    );
}

fn print_analysis(analysis: &Analysis, show_chart: bool) {
    let report = &analysis.report;
    println!(
        "\n✨ {} file(s), {} metadata column(s), systems: {}",
        analysis.records.len(),
        report.metadata_table.columns.len().saturating_sub(2),
        analysis
            .systems
            .iter()
            .map(|s| s.id())
            .collect::<Vec<_>>()
            .join(", ")
    );

    for name in &analysis.failed_extractions {
        eprintln!("⚠️  No metadata could be read from {}", name);
    }
    for (first, second) in &report.duplicates {
        print_duplicate_warning(first, second);
    }

    println!();
    display::print_comparisons(&report.comparisons);

    if show_chart {
        println!();
        display::print_chart(&report.comparisons);
    }

    if !report.geo.is_empty() {
        println!("\n🌍 {} file(s) carry GPS coordinates", report.geo.len());
    }
}

fn export(input: &Path, analysis: &Analysis, out: &Path, force: bool) -> Result<()> {
    let exporter = ExportService::new(out);
    let existing = exporter.existing_outputs(&analysis.report);

    if !existing.is_empty() && !force {
        for path in &existing {
            println!("   📄 {}", path.display());
        }
        let overwrite = Confirm::new()
            .with_prompt("These files already exist. Overwrite them?")
            .default(false)
            .interact()
            .context("Could not ask for confirmation; pass --force to overwrite")?;
        if !overwrite {
            println!("⚠️  Export skipped; existing files were left untouched.");
            return Ok(());
        }
    }

    let written = exporter
        .export_report(&analysis.report)
        .with_context(|| format!("Failed to export into {}", out.display()))?;
    for path in &written {
        println!("   💾 Wrote {}", path.display());
    }

    exporter
        .append_history(input, &analysis.report, analysis.records.len(), &written)
        .context("Failed to record run history")?;
    println!(
        "\n✅ Recorded run history in {}",
        exporter.out_dir().join(HISTORY_FILE).display()
    );
    Ok(())
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
