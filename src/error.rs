//! Error taxonomy for grade-file parsing, rubric loading and sheet merging.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GradeError>;

#[derive(Debug, Error)]
pub enum GradeError {
    /// A line is missing its colon, parenthesis or expected label.
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    /// A value where a number was expected did not parse.
    #[error("line {line}: `{value}` is not a number")]
    Parse { line: usize, value: String },

    #[error("identifier `{identifier}` is not present in the grade sheet")]
    Lookup { identifier: String },

    /// The file ends before a configured line.
    #[error("expected at least {expected} lines but the file has {found}")]
    Bounds { expected: usize, found: usize },

    #[error("invalid rubric: {0}")]
    Rubric(String),

    #[error("grade sheet column: {0}")]
    Column(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{}: {error}", .path.display())]
    InFile {
        path: PathBuf,
        error: Box<GradeError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl GradeError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        GradeError::Format {
            line,
            message: message.into(),
        }
    }

    /// Attaches the file path, unless the error already carries one.
    pub fn in_file(self, path: &Path) -> Self {
        match self {
            GradeError::InFile { .. } => self,
            error => GradeError::InFile {
                path: path.to_path_buf(),
                error: Box::new(error),
            },
        }
    }

    /// The underlying error with any path wrapping removed.
    pub fn root(&self) -> &GradeError {
        match self {
            GradeError::InFile { error, .. } => error.root(),
            other => other,
        }
    }

    /// Short category name used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            GradeError::Format { .. } => "format",
            GradeError::Parse { .. } => "parse",
            GradeError::Lookup { .. } => "lookup",
            GradeError::Bounds { .. } => "bounds",
            GradeError::Rubric(_) => "rubric",
            GradeError::Column(_) => "column",
            GradeError::Config(_) => "config",
            GradeError::Io(_) => "io",
            GradeError::Csv(_) => "csv",
            GradeError::InFile { .. } => unreachable!("root() unwraps InFile"),
        }
    }
}

/// Extension for attaching a path to any library result.
pub trait InFile<T> {
    fn in_file(self, path: &Path) -> Result<T>;
}

impl<T, E: Into<GradeError>> InFile<T> for std::result::Result<T, E> {
    fn in_file(self, path: &Path) -> Result<T> {
        self.map_err(|e| e.into().in_file(path))
    }
}
