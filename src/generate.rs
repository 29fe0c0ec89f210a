//! Blank evaluation files, one per submission in a roster directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::batch::{BatchReport, text_files};
use crate::error::{InFile, Result};
use crate::roster::RosterEntry;
use crate::rubric::{Rubric, display_width};

/// Writes a rubric template for every `*.txt` header file in `roster_dir`
/// into `out_dir`, named after the student. Existing files are overwritten.
///
/// Returns the paths written. Unreadable roster or output directories abort
/// the whole run; a bad header only fails its own file.
#[tracing::instrument(skip(rubric), fields(roster_dir = %roster_dir.display(), out_dir = %out_dir.display()))]
pub fn generate_comment_files(
    rubric: &Rubric,
    roster_dir: &Path,
    out_dir: &Path,
) -> Result<BatchReport<PathBuf>> {
    fs::create_dir_all(out_dir).in_file(out_dir)?;

    let mut report = BatchReport::new();
    for path in text_files(roster_dir)? {
        let result = write_comment_file(rubric, &path, out_dir);
        report.record(&path, result);
    }

    info!(count = report.succeeded.len(), "files processed");
    Ok(report)
}

fn write_comment_file(rubric: &Rubric, source: &Path, out_dir: &Path) -> Result<PathBuf> {
    let entry = RosterEntry::read(source)?;
    let target = out_dir.join(entry.file_name());

    let heading = rubric.heading(&entry);
    if display_width(&heading) > rubric.max_line_width() {
        warn!(name = %entry.name, "Heading is wider than the print limit");
    }

    fs::write(&target, rubric.render(&entry)).in_file(&target)?;
    debug!(name = %entry.name, target = %target.display(), "Comment file written");
    Ok(target)
}
