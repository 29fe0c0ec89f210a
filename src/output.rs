//! Output formatting and persistence for grading results.
//!
//! Supports JSON serialization, a text histogram, and CSV
//! writes.

use std::fs::{File, OpenOptions};
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::stats::Distribution;

/// Widest histogram bar, in characters.
const BAR_WIDTH: usize = 40;

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Renders the distribution summary as plain text lines.
pub fn render_distribution(dist: &Distribution) -> Vec<String> {
    let mut lines = vec![
        format!("Grades: {}", dist.count),
        format!("Avg: {:.2}", dist.mean),
        format!("Std dev: {:.2}", dist.stddev),
    ];

    if dist.count == 0 {
        return lines;
    }
    lines.push(format!("Range: {:.2} - {:.2}", dist.min, dist.max));

    let peak = dist.histogram.iter().map(|b| b.count).max().unwrap_or(0);
    lines.push("Histogram:".to_string());
    for (index, bin) in dist.histogram.iter().enumerate() {
        let close = if index + 1 == dist.histogram.len() { ']' } else { ')' };
        let bar = if peak == 0 {
            0
        } else {
            (bin.count * BAR_WIDTH).div_ceil(peak)
        };
        lines.push(format!(
            "  [{:6.2}, {:6.2}{close} {:<width$} {}",
            bin.lower,
            bin.upper,
            "#".repeat(bar),
            bin.count,
            width = BAR_WIDTH
        ));
    }

    lines.push("Counts:".to_string());
    for unique in &dist.unique {
        lines.push(format!("  {:6.2}  x{}", unique.value, unique.count));
    }

    if !dist.flagged.is_empty() {
        lines.push("Flagged for review:".to_string());
        for entry in &dist.flagged {
            lines.push(format!("  {} ({:.2})", entry.path.display(), entry.grade));
        }
    }

    lines
}

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, record: &impl Serialize) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    // Headers only go into a fresh file.
    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Writes `records` to a new CSV file, replacing any existing one.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(File::create(path)?);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(())
}
