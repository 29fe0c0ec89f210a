//! Print dispatch for graded evaluation files.

use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{GradeError, Result};

/// Sends a finished file to a printer. The result of the job itself is not
/// tracked; only a failure to hand the file over is reported.
pub trait PrintDispatch {
    fn dispatch(&self, path: &Path) -> Result<()>;
}

/// Runs an OS print command with the file path as its last argument.
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    program: String,
    args: Vec<String>,
}

impl CommandPrinter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn lpr() -> Self {
        Self::new("lpr", Vec::new())
    }
}

impl PrintDispatch for CommandPrinter {
    fn dispatch(&self, path: &Path) -> Result<()> {
        debug!(program = %self.program, path = %path.display(), "Dispatching print job");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .status()?;

        if !status.success() {
            return Err(GradeError::Io(io::Error::other(format!(
                "`{}` exited with {status}",
                self.program
            ))));
        }
        Ok(())
    }
}

/// Skips printing entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPrinter;

impl PrintDispatch for NoopPrinter {
    fn dispatch(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "Printing disabled, skipping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_printer() {
        assert!(NoopPrinter.dispatch(Path::new("anything.txt")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_printer_success() {
        let printer = CommandPrinter::new("true", Vec::new());
        assert!(printer.dispatch(Path::new("graded.txt")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_printer_failure_status() {
        let printer = CommandPrinter::new("false", Vec::new());
        let err = printer.dispatch(Path::new("graded.txt")).unwrap_err();
        assert!(err.to_string().contains("`false` exited"));
    }

    #[test]
    fn test_command_printer_missing_program() {
        let printer = CommandPrinter::new("essay-grader-no-such-printer", Vec::new());
        assert_eq!(
            printer.dispatch(Path::new("graded.txt")).unwrap_err().kind(),
            "io"
        );
    }
}
