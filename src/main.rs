//! CLI entry point for the essay grader.
//!
//! Provides subcommands for generating blank evaluation files, totalizing
//! and printing graded files, reporting the grade distribution, and merging
//! grades into a learning-management grade sheet.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use essay_grader::batch::BatchReport;
use essay_grader::config::GraderConfig;
use essay_grader::generate::generate_comment_files;
use essay_grader::output::{print_json, render_distribution, write_records};
use essay_grader::print::{NoopPrinter, PrintDispatch};
use essay_grader::sheet::{ColumnMatch, MergePaths, MissingIdentifierPolicy, merge_grades};
use essay_grader::stats::{FlagRule, grade_distribution};
use essay_grader::totalize::{TotalizeOptions, totalize_files};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "essay_grader")]
#[command(about = "Generate, total, report and export essay grades", long_about = None)]
struct Cli {
    /// TOML file with rubric, grade sheet, distribution and print settings
    #[arg(short, long, global = true, env = "ESSAY_GRADER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a blank evaluation file for every submission header
    Generate {
        /// Directory of submission header .txt files
        #[arg(short, long)]
        roster: PathBuf,

        /// Directory to write evaluation files into
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Sum the subscores of filled-in evaluation files and print them
    Total {
        /// Filled-in evaluation files
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Directory graded copies are written to
        #[arg(short, long)]
        graded: PathBuf,

        /// Skip print dispatch
        #[arg(long, default_value_t = false)]
        no_print: bool,

        /// CSV file to append each total to
        #[arg(short, long)]
        ledger: Option<PathBuf>,
    },
    /// Report mean, standard deviation and histogram of graded totals
    Distribution {
        /// Directory of graded evaluation files
        #[arg(short, long)]
        graded: PathBuf,

        /// Flag grades for review, e.g. "=6.5", "<5", ">=9.5"
        #[arg(short, long)]
        flag: Option<FlagRule>,

        /// Number of histogram bins
        #[arg(short, long)]
        bins: Option<usize>,

        /// Log the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// CSV file to write per-file grades to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write graded totals into a copy of the grade sheet
    Merge {
        /// Grade sheet CSV exported from the learning-management system
        #[arg(short, long)]
        sheet: PathBuf,

        /// Directory of submission header .txt files
        #[arg(short, long)]
        roster: PathBuf,

        /// Directory of graded evaluation files
        #[arg(short, long)]
        graded: PathBuf,

        /// Path of the new grade sheet (must differ from --sheet)
        #[arg(short, long)]
        output: PathBuf,

        /// Column holding the student identifier
        #[arg(long)]
        index_column: Option<String>,

        /// Exact name of the column to write grades into
        #[arg(long)]
        target_column: Option<String>,

        /// Only merge roster files whose name contains this text
        #[arg(long)]
        marker: Option<String>,

        /// Skip students missing from the sheet instead of aborting
        #[arg(long, default_value_t = false)]
        skip_missing: bool,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/essay_grader.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("essay_grader.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GraderConfig::load(path)?,
        None => GraderConfig::default(),
    };
    let rubric = config.rubric().context("rubric configuration")?;
    info!(
        subscore_lines = ?rubric.subscore_lines(),
        total_line = rubric.total_line(),
        max_points = rubric.max_points(),
        "Rubric loaded"
    );

    match cli.command {
        Commands::Generate { roster, out } => {
            let report = generate_comment_files(&rubric, &roster, &out)?;
            finish("generate", &report)?;
        }
        Commands::Total {
            files,
            graded,
            no_print,
            ledger,
        } => {
            let printer: Box<dyn PrintDispatch> = if no_print {
                Box::new(NoopPrinter)
            } else {
                config.print.printer()
            };
            let options = TotalizeOptions {
                graded_dir: &graded,
                printer: printer.as_ref(),
                ledger: ledger.as_deref(),
            };

            let report = totalize_files(&files, &rubric, &options);
            finish("total", &report)?;
        }
        Commands::Distribution {
            graded,
            flag,
            bins,
            json,
            output,
        } => {
            let flag = flag.or(config.distribution.flag);
            let bins = bins.unwrap_or(config.distribution.bins);

            let (dist, report) = grade_distribution(&rubric, &graded, bins, flag)?;
            if json {
                print_json(&dist)?;
            } else {
                for line in render_distribution(&dist) {
                    info!("{line}");
                }
            }
            if let Some(output) = output {
                write_records(&output, &report.succeeded)?;
                info!(output = %output.display(), "Grades written");
            }
            finish("distribution", &report)?;
        }
        Commands::Merge {
            sheet,
            roster,
            graded,
            output,
            index_column,
            target_column,
            marker,
            skip_missing,
        } => {
            if let Some(index_column) = index_column {
                config.sheet.index_column = index_column;
            }
            if let Some(target_column) = target_column {
                config.sheet.target_column = ColumnMatch::Exact(target_column);
            }
            if marker.is_some() {
                config.sheet.file_marker = marker;
            }
            if skip_missing {
                config.sheet.missing_identifiers = MissingIdentifierPolicy::Skip;
            }

            let paths = MergePaths {
                sheet: &sheet,
                roster_dir: &roster,
                graded_dir: &graded,
                output: &output,
            };
            let report = merge_grades(&rubric, &config.sheet, &paths)?;
            finish("merge", &report)?;
        }
    }

    Ok(())
}

/// Logs the batch summary and turns any failed file into a non-zero exit.
fn finish<T>(operation: &str, report: &BatchReport<T>) -> Result<()> {
    report.log_summary(operation);
    if !report.is_clean() {
        bail!(
            "{operation}: {} of {} files failed",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}
