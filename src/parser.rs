//! Line-oriented reader and writer for evaluation files.
//!
//! A [`GradeFile`] keeps every line with its original terminator so that a
//! rewrite of one line leaves the rest of the file byte-for-byte intact.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{GradeError, InFile, Result};
use crate::rubric::Rubric;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GradeFile {
    lines: Vec<String>,
}

impl GradeFile {
    pub fn parse(text: &str) -> Self {
        GradeFile {
            lines: text.split_inclusive('\n').map(str::to_string).collect(),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).in_file(path)?;
        Ok(Self::parse(&text))
    }

    /// Reads at most the first `count` lines of `path`.
    pub fn read_head(path: &Path, count: usize) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path).in_file(path)?);
        let mut lines = Vec::with_capacity(count);

        while lines.len() < count {
            let mut line = String::new();
            if reader.read_line(&mut line).in_file(path)? == 0 {
                break;
            }
            lines.push(line);
        }

        Ok(GradeFile { lines })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines including their terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The 1-based line `number`, terminator included.
    ///
    /// # Errors
    ///
    /// Returns [`GradeError::Bounds`] if the file is shorter than `number`.
    pub fn line(&self, number: usize) -> Result<&str> {
        number
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
            .ok_or(GradeError::Bounds {
                expected: number,
                found: self.lines.len(),
            })
    }

    /// Splits line `number` at its first colon and checks the label against
    /// the rubric. Returns `(label, value)` with the terminator removed.
    fn field(&self, number: usize, rubric: &Rubric) -> Result<(&str, &str)> {
        let line = strip_terminator(self.line(number)?);
        let colon = line
            .find(':')
            .ok_or_else(|| GradeError::format(number, "expected `label: value`, found no `:`"))?;
        let label = &line[..colon];
        rubric.check_label(number, label)?;
        Ok((label, &line[colon + 1..]))
    }

    /// Numeric value after the first colon of line `number`.
    pub fn value_at(&self, number: usize, rubric: &Rubric) -> Result<f64> {
        let (_, raw) = self.field(number, rubric)?;
        parse_value(number, raw)
    }

    /// Values on every subscore line, in rubric order.
    pub fn subscores(&self, rubric: &Rubric) -> Result<Vec<f64>> {
        rubric
            .subscore_lines()
            .iter()
            .map(|&number| self.value_at(number, rubric))
            .collect()
    }

    /// The value already written on the total line.
    pub fn total(&self, rubric: &Rubric) -> Result<f64> {
        self.value_at(rubric.total_line(), rubric)
    }

    /// A copy with the total line's value replaced by `total`.
    ///
    /// Everything up to and including the first colon, and the line
    /// terminator, are kept.
    pub fn with_total(&self, rubric: &Rubric, total: f64) -> Result<GradeFile> {
        let number = rubric.total_line();
        let (label, _) = self.field(number, rubric)?;
        let ending = terminator(self.line(number)?);
        let rewritten = format!("{label}: {total:.2}{ending}");

        let mut lines = self.lines.clone();
        lines[number - 1] = rewritten;
        Ok(GradeFile { lines })
    }

    /// Free-form comments: the final line of the file.
    pub fn comments(&self) -> &str {
        self.lines
            .last()
            .map_or("", |line| strip_terminator(line).trim())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string()).in_file(path)
    }
}

impl fmt::Display for GradeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

fn parse_value(number: usize, raw: &str) -> Result<f64> {
    let value = raw.trim();
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(GradeError::Parse {
            line: number,
            value: value.to_string(),
        }),
    }
}

fn terminator(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn strip_terminator(line: &str) -> &str {
    &line[..line.len() - terminator(line).len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::RosterEntry;

    fn filled(values: [&str; 5]) -> String {
        format!(
            "Grading for Jane Doe EGR260 essay one:\n\
             \n\
             Argument quality:\n\
             \t Added personal opinion/elaborated on points (out of 1.5): {}\n\
             \t Arguments are logical and follow from presented material (out of 2.5): {}\n\
             Presentation effectiveness:\n\
             \t Use of outside material (quotes, citations) (out of 3.0): {}\n\
             \t Flow of essay (out of 1.5): {}\n\
             Mechanics:\n\
             \t Grammar, spelling (out of 1.5): {}\n\
             \n\
             Total (out of 10.0):\n\
             \n\
             Comments:\n\
             Strong thesis, cite sources consistently.\n",
            values[0], values[1], values[2], values[3], values[4]
        )
    }

    #[test]
    fn test_parse_keeps_bytes() {
        let text = "a: 1\r\nb: 2\nlast";
        let file = GradeFile::parse(text);

        assert_eq!(file.len(), 3);
        assert_eq!(file.to_string(), text);
    }

    #[test]
    fn test_line_out_of_bounds() {
        let file = GradeFile::parse("one\ntwo\n");

        assert_eq!(file.line(2).unwrap(), "two\n");
        assert!(matches!(
            file.line(3),
            Err(GradeError::Bounds {
                expected: 3,
                found: 2
            })
        ));
        assert!(file.line(0).is_err());
    }

    #[test]
    fn test_subscores() {
        let file = GradeFile::parse(&filled(["1.5", "2.0", "3", " 1.0 ", "1"]));
        let scores = file.subscores(&Rubric::default()).unwrap();

        assert_eq!(scores, vec![1.5, 2.0, 3.0, 1.0, 1.0]);
    }

    #[test]
    fn test_non_numeric_subscore() {
        let file = GradeFile::parse(&filled(["1.5", "two", "3", "1", "1"]));
        let err = file.subscores(&Rubric::default()).unwrap_err();

        assert!(matches!(err, GradeError::Parse { line: 5, ref value } if value == "two"));
    }

    #[test]
    fn test_empty_subscore_is_parse_error() {
        let file = GradeFile::parse(&filled(["1.5", "", "3", "1", "1"]));
        assert!(matches!(
            file.subscores(&Rubric::default()),
            Err(GradeError::Parse { line: 5, .. })
        ));
    }

    #[test]
    fn test_nan_is_rejected() {
        let file = GradeFile::parse(&filled(["NaN", "2", "3", "1", "1"]));
        assert!(file.subscores(&Rubric::default()).is_err());
    }

    #[test]
    fn test_missing_colon_is_format_error() {
        let text = filled(["1", "2", "3", "1", "1"]).replace("Flow of essay (out of 1.5):", "Flow");
        let err = GradeFile::parse(&text)
            .subscores(&Rubric::default())
            .unwrap_err();

        assert!(matches!(err, GradeError::Format { line: 8, .. }));
    }

    #[test]
    fn test_misplaced_line_is_format_error() {
        // An extra line shifts every role down by one.
        let text = format!("extra: 0\n{}", filled(["1", "2", "3", "1", "1"]));
        let err = GradeFile::parse(&text)
            .subscores(&Rubric::default())
            .unwrap_err();

        assert!(matches!(err, GradeError::Format { line: 4, .. }));
    }

    #[test]
    fn test_with_total_rewrites_only_total_line() {
        let file = GradeFile::parse(&filled(["1.5", "2.0", "3.0", "1.0", "1.0"]));
        let rubric = Rubric::default();
        let graded = file.with_total(&rubric, 8.5).unwrap();

        assert_eq!(graded.line(12).unwrap(), "Total (out of 10.0): 8.50\n");
        for (number, (before, after)) in file.lines().zip(graded.lines()).enumerate() {
            if number + 1 != 12 {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_with_total_keeps_crlf() {
        let text = filled(["1", "1", "1", "1", "1"]).replace('\n', "\r\n");
        let graded = GradeFile::parse(&text)
            .with_total(&Rubric::default(), 5.0)
            .unwrap();

        assert_eq!(graded.line(12).unwrap(), "Total (out of 10.0): 5.00\r\n");
    }

    #[test]
    fn test_total_of_ungraded_file_is_parse_error() {
        let text = Rubric::default().render(&RosterEntry {
            name: "Jane Doe".into(),
            identifier: "jdoe123".into(),
        });
        let err = GradeFile::parse(&text)
            .total(&Rubric::default())
            .unwrap_err();

        assert!(matches!(err, GradeError::Parse { line: 12, .. }));
    }

    #[test]
    fn test_comments_is_last_line() {
        let file = GradeFile::parse(&filled(["1", "1", "1", "1", "1"]));
        assert_eq!(file.comments(), "Strong thesis, cite sources consistently.");
        assert_eq!(GradeFile::default().comments(), "");
    }
}
