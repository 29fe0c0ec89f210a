//! Sums subscores into the total line and publishes the graded file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::batch::{BatchReport, same_file};
use crate::error::{GradeError, InFile, Result};
use crate::output::append_record;
use crate::parser::GradeFile;
use crate::print::PrintDispatch;
use crate::rubric::Rubric;

/// Computes the total of `file` and returns it with the rewritten copy.
///
/// Every subscore and the total line are validated before anything is
/// rewritten, so an error leaves no partial result.
pub fn totalize(file: &GradeFile, rubric: &Rubric) -> Result<(f64, GradeFile)> {
    let total: f64 = file.subscores(rubric)?.iter().sum();
    let graded = file.with_total(rubric, total)?;
    Ok((total, graded))
}

/// A graded evaluation file that was written out.
#[derive(Debug, Clone, Serialize)]
pub struct GradedFile {
    /// File stem of the source, usually the student's name.
    pub label: String,
    pub source: PathBuf,
    pub output: PathBuf,
    pub total: f64,
    pub comments: String,
    pub printed: bool,
    /// A ledger row was appended for this file.
    pub ledgered: bool,
}

/// One row of the grading ledger CSV.
#[derive(Debug, Serialize)]
pub struct LedgerRecord {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub total: String,
    pub comments: String,
    pub output: String,
}

impl From<&GradedFile> for LedgerRecord {
    fn from(graded: &GradedFile) -> Self {
        LedgerRecord {
            timestamp: Utc::now(),
            label: graded.label.clone(),
            total: format!("{:.2}", graded.total),
            comments: graded.comments.clone(),
            output: graded.output.display().to_string(),
        }
    }
}

/// Where and how graded files are published.
pub struct TotalizeOptions<'a> {
    pub graded_dir: &'a Path,
    pub printer: &'a dyn PrintDispatch,
    /// Optional CSV file every graded total is appended to.
    pub ledger: Option<&'a Path>,
}

/// Totalizes one file into `graded_dir` under the same file name, then
/// hands the result to the printer.
///
/// Once the graded file is written, a failed print or ledger append is
/// logged and reported through [`GradedFile::printed`] and
/// [`GradedFile::ledgered`]; the graded file is kept.
///
/// # Errors
///
/// Fails without writing if the file does not totalize or `graded_dir`
/// would put the graded copy over the source.
#[tracing::instrument(skip(rubric, options), fields(path = %path.display()))]
pub fn totalize_file(path: &Path, rubric: &Rubric, options: &TotalizeOptions) -> Result<GradedFile> {
    let file = GradeFile::read(path)?;
    let (total, graded) = totalize(&file, rubric).in_file(path)?;

    let file_name = path.file_name().unwrap_or(path.as_os_str());
    let output = options.graded_dir.join(file_name);
    if same_file(path, &output) {
        return Err(GradeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "refusing to overwrite the source file; choose another graded directory",
        ))
        .in_file(path));
    }
    fs::create_dir_all(options.graded_dir).in_file(options.graded_dir)?;
    graded.write(&output)?;

    let label = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let comments = graded.comments().to_string();
    info!(label = %label, total = %format!("{total:.2}"), comments = %comments, "grade");

    let printed = match options.printer.dispatch(&output) {
        Ok(()) => true,
        Err(e) => {
            warn!(output = %output.display(), error = %e, "Print dispatch failed");
            false
        }
    };

    let mut graded_file = GradedFile {
        label,
        source: path.to_path_buf(),
        output,
        total,
        comments,
        printed,
        ledgered: false,
    };

    if let Some(ledger) = options.ledger {
        match append_record(ledger, &LedgerRecord::from(&graded_file)) {
            Ok(()) => graded_file.ledgered = true,
            Err(e) => {
                warn!(ledger = %ledger.display(), error = %e, "Ledger append failed");
            }
        }
    }

    Ok(graded_file)
}

/// Totalizes each path independently.
pub fn totalize_files(
    paths: &[PathBuf],
    rubric: &Rubric,
    options: &TotalizeOptions,
) -> BatchReport<GradedFile> {
    let mut report = BatchReport::new();
    for path in paths {
        report.record(path, totalize_file(path, rubric, options));
    }
    report
}
