//! Per-file result collection for operations over a directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{GradeError, InFile, Result};

/// A file that could not be processed.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: GradeError,
}

/// Outcome of running one operation over many files. One failing file never
/// stops the others.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<FileFailure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &Path, result: Result<T>) {
        match result {
            Ok(value) => self.succeeded.push(value),
            Err(error) => self.fail(path, error),
        }
    }

    pub fn fail(&mut self, path: &Path, error: GradeError) {
        debug!(path = %path.display(), kind = error.kind(), error = %error, "File failed");
        self.failed.push(FileFailure {
            path: path.to_path_buf(),
            error: error.in_file(path),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Logs the succeeded/failed counts and every failure.
    pub fn log_summary(&self, operation: &str) {
        info!(
            operation,
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            "{} files processed",
            self.total()
        );
        for failure in &self.failed {
            warn!(
                operation,
                path = %failure.path.display(),
                kind = failure.error.kind(),
                "{}",
                failure.error
            );
        }
    }
}

/// `*.txt` files directly inside `dir`, sorted by path.
pub fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir).in_file(dir)? {
        let path = entry.in_file(dir)?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Whether `a` and `b` name the same file, resolving links and relative
/// paths when both exist.
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_splits_results() {
        let mut report = BatchReport::new();
        report.record(Path::new("a.txt"), Ok(1));
        report.record(
            Path::new("b.txt"),
            Err(GradeError::Bounds {
                expected: 12,
                found: 2,
            }),
        );

        assert_eq!(report.succeeded, vec![1]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.total(), 2);
        assert!(!report.is_clean());
        assert!(report.failed[0].error.to_string().starts_with("b.txt:"));
        report.log_summary("test");
    }

    #[test]
    fn test_text_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("notes.docx"), "").unwrap();
        fs::create_dir(dir.path().join("sub.txt")).unwrap();

        let files = text_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();

        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_same_file_resolves_relative_parts() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        assert!(same_file(&file, &dir.path().join("sub/../a.txt")));
        assert!(!same_file(&file, &dir.path().join("b.txt")));
    }

    #[test]
    fn test_text_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = text_files(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
