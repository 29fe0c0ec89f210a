//! Rubric layout: which line of a grade file plays which role.
//!
//! A rubric is declared as an ordered list of template lines. Line 1 is the
//! heading, and each entry of [`RubricConfig::lines`] occupies the next line.
//! Subscore and total line numbers are derived from that layout, so the
//! template a [`Rubric`] renders and the positions it reads back can never
//! drift apart.

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};
use crate::roster::RosterEntry;

/// Columns a tab advances to when measuring rendered width.
const TAB_WIDTH: usize = 8;

/// One line of the evaluation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RubricLine {
    /// Fixed text, e.g. a section heading.
    Text { text: String },
    Blank,
    /// A sub-criterion the grader fills in.
    Score {
        label: String,
        out_of: f64,
        #[serde(default = "default_indent")]
        indent: String,
    },
    /// The line the totalizer rewrites with the sum of all scores.
    Total { label: String },
}

fn default_indent() -> String {
    "\t ".to_string()
}

/// Serializable rubric description, as found in the `[rubric]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubricConfig {
    /// First line of every generated file. `{name}` and `{identifier}` are
    /// substituted from the roster entry.
    pub heading: String,
    pub lines: Vec<RubricLine>,
    /// Require the text before the colon on each score/total line to match
    /// the declared label when reading a filled-in file.
    pub strict_labels: bool,
    pub max_line_width: usize,
}

impl Default for RubricConfig {
    fn default() -> Self {
        let score = |label: &str, out_of: f64| RubricLine::Score {
            label: label.to_string(),
            out_of,
            indent: default_indent(),
        };
        let text = |text: &str| RubricLine::Text {
            text: text.to_string(),
        };

        RubricConfig {
            heading: "Grading for {name} EGR260 essay one:".to_string(),
            lines: vec![
                RubricLine::Blank,
                text("Argument quality:"),
                score("Added personal opinion/elaborated on points", 1.5),
                score("Arguments are logical and follow from presented material", 2.5),
                text("Presentation effectiveness:"),
                score("Use of outside material (quotes, citations)", 3.0),
                score("Flow of essay", 1.5),
                text("Mechanics:"),
                score("Grammar, spelling", 1.5),
                RubricLine::Blank,
                RubricLine::Total {
                    label: "Total".to_string(),
                },
                RubricLine::Blank,
                text("Comments:"),
            ],
            strict_labels: true,
            max_line_width: 80,
        }
    }
}

/// Role of a line the rubric reads or writes.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRole {
    Score { out_of: f64 },
    Total,
}

/// A line position with its role and the label expected before its colon.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleLine {
    pub line: usize,
    pub role: LineRole,
    pub label: String,
}

/// A validated rubric with its line-role schema resolved.
#[derive(Debug, Clone)]
pub struct Rubric {
    config: RubricConfig,
    roles: Vec<RoleLine>,
    subscore_lines: Vec<usize>,
    total_line: usize,
    max_points: f64,
}

impl Default for Rubric {
    fn default() -> Self {
        Self::build(RubricConfig::default())
    }
}

impl Rubric {
    /// Validates `config` and resolves its line roles.
    ///
    /// # Errors
    ///
    /// Returns [`GradeError::Rubric`] if the layout has no score lines, does
    /// not have exactly one total line, contains labels with a colon or
    /// newline, or renders a fixed line wider than `max_line_width`.
    pub fn new(config: RubricConfig) -> Result<Self> {
        validate(&config)?;
        let rubric = Self::build(config);

        for (index, text) in rubric.template_lines().iter().enumerate() {
            let width = display_width(text);
            if width > rubric.config.max_line_width {
                return Err(GradeError::Rubric(format!(
                    "line {} is {} columns wide, limit is {}",
                    index + 2,
                    width,
                    rubric.config.max_line_width
                )));
            }
        }

        Ok(rubric)
    }

    fn build(config: RubricConfig) -> Self {
        let max_points: f64 = config
            .lines
            .iter()
            .filter_map(|l| match l {
                RubricLine::Score { out_of, .. } => Some(*out_of),
                _ => None,
            })
            .sum();

        let mut roles = Vec::new();
        for (index, line) in config.lines.iter().enumerate() {
            let number = index + 2;
            match line {
                RubricLine::Score { label, out_of, .. } => roles.push(RoleLine {
                    line: number,
                    role: LineRole::Score { out_of: *out_of },
                    label: format!("{} (out of {})", label.trim(), format_points(*out_of)),
                }),
                RubricLine::Total { label } => roles.push(RoleLine {
                    line: number,
                    role: LineRole::Total,
                    label: format!("{} (out of {})", label.trim(), format_points(max_points)),
                }),
                RubricLine::Text { .. } | RubricLine::Blank => {}
            }
        }

        let subscore_lines = roles
            .iter()
            .filter(|r| matches!(r.role, LineRole::Score { .. }))
            .map(|r| r.line)
            .collect();
        let total_line = roles
            .iter()
            .find(|r| r.role == LineRole::Total)
            .map_or(0, |r| r.line);

        Rubric {
            config,
            roles,
            subscore_lines,
            total_line,
            max_points,
        }
    }

    pub fn config(&self) -> &RubricConfig {
        &self.config
    }

    /// 1-based line numbers holding subscores, in rubric order.
    pub fn subscore_lines(&self) -> &[usize] {
        &self.subscore_lines
    }

    /// 1-based line number holding the total.
    pub fn total_line(&self) -> usize {
        self.total_line
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn roles(&self) -> &[RoleLine] {
        &self.roles
    }

    pub fn max_line_width(&self) -> usize {
        self.config.max_line_width
    }

    /// Checks the label part of a score or total line against the layout.
    ///
    /// A no-op when `strict_labels` is off or `line` has no role.
    pub fn check_label(&self, line: usize, label: &str) -> Result<()> {
        if !self.config.strict_labels {
            return Ok(());
        }
        let Some(role) = self.roles.iter().find(|r| r.line == line) else {
            return Ok(());
        };
        if label.trim() != role.label {
            return Err(GradeError::format(
                line,
                format!("expected label `{}`, found `{}`", role.label, label.trim()),
            ));
        }
        Ok(())
    }

    /// The heading line for one student.
    pub fn heading(&self, entry: &RosterEntry) -> String {
        self.config
            .heading
            .replace("{name}", &entry.name)
            .replace("{identifier}", &entry.identifier)
    }

    /// Renders the empty evaluation file for one student.
    pub fn render(&self, entry: &RosterEntry) -> String {
        let mut out = self.heading(entry);
        out.push('\n');
        for line in self.template_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Template lines after the heading, without terminators.
    fn template_lines(&self) -> Vec<String> {
        self.config
            .lines
            .iter()
            .enumerate()
            .map(|(index, line)| (index + 2, line))
            .map(|(number, line)| match line {
                RubricLine::Text { text } => text.clone(),
                RubricLine::Blank => String::new(),
                RubricLine::Score { indent, .. } => {
                    format!("{indent}{}: ", self.role_label(number))
                }
                RubricLine::Total { .. } => format!("{}:", self.role_label(number)),
            })
            .collect()
    }

    fn role_label(&self, line: usize) -> &str {
        self.roles
            .iter()
            .find(|r| r.line == line)
            .map_or("", |r| r.label.as_str())
    }
}

/// Formats a point weight as declared: whole numbers keep one decimal
/// (`10.0`), anything else keeps every significant digit (`0.25`).
fn format_points(points: f64) -> String {
    // Sums like 0.1 + 0.2 carry float noise past the declared digits.
    let points = (points * 1e6).round() / 1e6;
    if points.fract() == 0.0 {
        format!("{points:.1}")
    } else {
        format!("{points}")
    }
}

/// Rendered width of `text`, expanding tabs to the next tab stop.
pub fn display_width(text: &str) -> usize {
    text.chars().fold(0, |col, c| {
        if c == '\t' {
            (col / TAB_WIDTH + 1) * TAB_WIDTH
        } else {
            col + 1
        }
    })
}

fn validate(config: &RubricConfig) -> Result<()> {
    let invalid = |msg: String| Err(GradeError::Rubric(msg));

    if config.heading.contains('\n') {
        return invalid("heading must be a single line".into());
    }

    let mut scores = 0;
    let mut totals = 0;
    for (index, line) in config.lines.iter().enumerate() {
        let number = index + 2;
        match line {
            RubricLine::Text { text } => {
                if text.contains('\n') {
                    return invalid(format!("line {number}: text must be a single line"));
                }
            }
            RubricLine::Blank => {}
            RubricLine::Score {
                label,
                out_of,
                indent,
            } => {
                scores += 1;
                check_role_label(number, label)?;
                if indent.contains(['\n', ':']) {
                    return invalid(format!("line {number}: indent may only hold whitespace"));
                }
                if !out_of.is_finite() || *out_of < 0.0 {
                    return invalid(format!("line {number}: `out_of` must be a non-negative number"));
                }
            }
            RubricLine::Total { label } => {
                totals += 1;
                check_role_label(number, label)?;
            }
        }
    }

    if scores == 0 {
        return invalid("at least one score line is required".into());
    }
    if totals != 1 {
        return invalid(format!("exactly one total line is required, found {totals}"));
    }
    Ok(())
}

fn check_role_label(line: usize, label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(GradeError::Rubric(format!("line {line}: label is empty")));
    }
    if label.contains([':', '\n']) {
        return Err(GradeError::Rubric(format!(
            "line {line}: label `{label}` may not contain `:` or a newline"
        )));
    }
    Ok(())
}
