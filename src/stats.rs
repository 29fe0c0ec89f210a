//! Grade distribution across a directory of graded files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::{BatchReport, text_files};
use crate::error::{GradeError, Result};
use crate::parser::GradeFile;
use crate::rubric::Rubric;

/// Tolerance for equality comparisons between grades.
const EPSILON: f64 = 1e-9;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Which grades get flagged for a manual double-check.
///
/// Parsed from `=6.5`, `<5`, `<=5`, `>9.5`, `>=9.5`, or a bare number
/// meaning equality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FlagRule {
    Equals(f64),
    Below(f64),
    AtMost(f64),
    Above(f64),
    AtLeast(f64),
}

impl FlagRule {
    pub fn matches(&self, grade: f64) -> bool {
        match *self {
            FlagRule::Equals(v) => (grade - v).abs() < EPSILON,
            FlagRule::Below(v) => grade < v,
            FlagRule::AtMost(v) => grade <= v + EPSILON,
            FlagRule::Above(v) => grade > v,
            FlagRule::AtLeast(v) => grade >= v - EPSILON,
        }
    }
}

impl FromStr for FlagRule {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (rule, rest): (fn(f64) -> FlagRule, &str) = if let Some(rest) = s.strip_prefix("<=") {
            (FlagRule::AtMost, rest)
        } else if let Some(rest) = s.strip_prefix(">=") {
            (FlagRule::AtLeast, rest)
        } else if let Some(rest) = s.strip_prefix("==") {
            (FlagRule::Equals, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (FlagRule::Below, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (FlagRule::Above, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (FlagRule::Equals, rest)
        } else {
            (FlagRule::Equals, s)
        };

        match rest.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(rule(v)),
            _ => Err(GradeError::Config(format!("invalid flag rule `{s}`"))),
        }
    }
}

impl TryFrom<String> for FlagRule {
    type Error = GradeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FlagRule> for String {
    fn from(rule: FlagRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for FlagRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagRule::Equals(v) => write!(f, "={v}"),
            FlagRule::Below(v) => write!(f, "<{v}"),
            FlagRule::AtMost(v) => write!(f, "<={v}"),
            FlagRule::Above(v) => write!(f, ">{v}"),
            FlagRule::AtLeast(v) => write!(f, ">={v}"),
        }
    }
}

/// The total read from one graded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeEntry {
    pub path: PathBuf,
    pub grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: f64,
    pub count: usize,
}

/// Summary statistics over a set of grades.
#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub histogram: Vec<HistogramBin>,
    pub unique: Vec<ValueCount>,
    pub flagged: Vec<GradeEntry>,
}

impl Distribution {
    pub fn from_grades(entries: &[GradeEntry], bins: usize, flag: Option<FlagRule>) -> Self {
        let grades: Vec<f64> = entries.iter().map(|e| e.grade).collect();
        let avg = mean(&grades);

        let flagged = match flag {
            Some(rule) => entries
                .iter()
                .filter(|e| rule.matches(e.grade))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let (min, max) = if grades.is_empty() {
            (0.0, 0.0)
        } else {
            (
                grades.iter().copied().fold(f64::INFINITY, f64::min),
                grades.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        Distribution {
            count: grades.len(),
            mean: avg,
            stddev: stddev(&grades, avg),
            min,
            max,
            histogram: histogram(&grades, bins),
            unique: unique_counts(&grades),
            flagged,
        }
    }
}

/// Equal-width bins spanning `[min, max]`; the last bin is closed on the
/// right. A single distinct value is widened to `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (hi - lo).abs() < EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for &v in values {
        let index = (((v - lo) / width) as usize).min(bins - 1);
        out[index].count += 1;
    }
    out
}

/// Distinct values in ascending order with their frequencies.
pub fn unique_counts(values: &[f64]) -> Vec<ValueCount> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut out: Vec<ValueCount> = Vec::new();
    for v in sorted {
        match out.last_mut() {
            Some(last) if last.value == v => last.count += 1,
            _ => out.push(ValueCount { value: v, count: 1 }),
        }
    }
    out
}

/// Reads the total line of one graded file, ignoring the lines after it.
pub fn read_grade(path: &Path, rubric: &Rubric) -> Result<GradeEntry> {
    let head = GradeFile::read_head(path, rubric.total_line())?;
    let grade = head.total(rubric).map_err(|e| e.in_file(path))?;
    Ok(GradeEntry {
        path: path.to_path_buf(),
        grade,
    })
}

/// Collects the totals in `graded_dir` and summarizes them. Files that fail
/// to parse are reported and left out of the statistics.
#[tracing::instrument(skip(rubric), fields(graded_dir = %graded_dir.display()))]
pub fn grade_distribution(
    rubric: &Rubric,
    graded_dir: &Path,
    bins: usize,
    flag: Option<FlagRule>,
) -> Result<(Distribution, BatchReport<GradeEntry>)> {
    let mut report = BatchReport::new();
    for path in text_files(graded_dir)? {
        report.record(&path, read_grade(&path, rubric));
    }

    let dist = Distribution::from_grades(&report.succeeded, bins, flag);
    for entry in &dist.flagged {
        warn!(path = %entry.path.display(), grade = entry.grade, "Grade flagged for review");
    }
    info!(count = dist.count, mean = dist.mean, stddev = dist.stddev, "Grade distribution");

    Ok((dist, report))
}
