//! Learning-management grade sheet: load, update one column, save a copy.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::{BatchReport, same_file, text_files};
use crate::error::{GradeError, InFile, Result};
use crate::roster::RosterEntry;
use crate::rubric::Rubric;
use crate::stats::read_grade;

/// Selects one column by header name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatch {
    Exact(String),
    /// Header contains the text. Must match exactly one column.
    Contains(String),
}

impl ColumnMatch {
    fn is_match(&self, header: &str) -> bool {
        match self {
            ColumnMatch::Exact(name) => header == name,
            ColumnMatch::Contains(part) => header.contains(part.as_str()),
        }
    }
}

impl std::fmt::Display for ColumnMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnMatch::Exact(name) => write!(f, "`{name}`"),
            ColumnMatch::Contains(part) => write!(f, "containing `{part}`"),
        }
    }
}

/// Declared rename of one column on output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    #[serde(rename = "match")]
    pub from: ColumnMatch,
    pub to: String,
    /// Skip the rename when no column matches instead of failing.
    #[serde(default)]
    pub optional: bool,
}

/// What to do when a graded student is missing from the sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIdentifierPolicy {
    /// Abort the merge before the sheet is touched.
    #[default]
    FailFast,
    /// Report the file as failed and merge the rest.
    Skip,
}

/// The `[sheet]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub index_column: String,
    pub target_column: ColumnMatch,
    /// Only roster files whose name contains this text are merged. Empty
    /// means every file.
    pub file_marker: Option<String>,
    pub renames: Vec<ColumnRename>,
    pub missing_identifiers: MissingIdentifierPolicy,
}

impl Default for SheetConfig {
    fn default() -> Self {
        SheetConfig {
            index_column: "Username".to_string(),
            target_column: ColumnMatch::Exact("Essay #1 [Total Pts: 100] |316818".to_string()),
            file_marker: Some("Essay".to_string()),
            renames: vec![ColumnRename {
                from: ColumnMatch::Contains("Last Name".to_string()),
                to: "Last Name".to_string(),
                optional: true,
            }],
            missing_identifiers: MissingIdentifierPolicy::FailFast,
        }
    }
}

/// A grade sheet held fully in memory, indexed by a unique identifier column.
#[derive(Debug, Clone)]
pub struct GradeSheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl GradeSheet {
    pub fn load(path: &Path, index_column: &str) -> Result<Self> {
        let file = File::open(path).in_file(path)?;
        Self::from_reader(file, index_column).in_file(path)
    }

    /// Reads a CSV with a header row. A UTF-8 byte-order mark before the
    /// first header is dropped and short rows are padded.
    pub fn from_reader<R: Read>(reader: R, index_column: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);

        let mut headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if let Some(first) = headers.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }

        let key = find_column(&headers, &ColumnMatch::Exact(index_column.to_string()))?;

        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for (row_number, record) in rdr.records().enumerate() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() > headers.len() {
                return Err(GradeError::format(
                    row_number + 2,
                    format!("row has {} fields, header has {}", row.len(), headers.len()),
                ));
            }
            row.resize(headers.len(), String::new());

            let identifier = row[key].clone();
            if index.insert(identifier.clone(), rows.len()).is_some() {
                return Err(GradeError::format(
                    row_number + 2,
                    format!("identifier `{identifier}` appears more than once"),
                ));
            }
            rows.push(row);
        }

        Ok(GradeSheet {
            headers,
            rows,
            index,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Position of the single column matching `column`.
    pub fn column(&self, column: &ColumnMatch) -> Result<usize> {
        find_column(&self.headers, column)
    }

    pub fn get(&self, identifier: &str, column: usize) -> Option<&str> {
        let row = *self.index.get(identifier)?;
        self.rows[row].get(column).map(String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`GradeError::Lookup`] if `identifier` has no row; the sheet
    /// is unchanged in that case.
    pub fn set(&mut self, identifier: &str, column: usize, value: String) -> Result<()> {
        let row = *self.index.get(identifier).ok_or_else(|| GradeError::Lookup {
            identifier: identifier.to_string(),
        })?;
        let cell = self.rows[row]
            .get_mut(column)
            .ok_or_else(|| GradeError::Column(format!("no column at position {column}")))?;
        *cell = value;
        Ok(())
    }

    /// Applies every rename, or none of them if any is ambiguous, would
    /// leave two columns with the same name, or matches nothing without
    /// being optional.
    pub fn rename_columns(&mut self, renames: &[ColumnRename]) -> Result<()> {
        let mut headers = self.headers.clone();
        let mut renamed = Vec::new();

        for rename in renames {
            if rename.optional && matching_columns(&self.headers, &rename.from).is_empty() {
                debug!(column = %rename.from, to = %rename.to, "No column to rename");
                continue;
            }
            let position = find_column(&self.headers, &rename.from)?;
            if renamed.contains(&position) {
                return Err(GradeError::Column(format!(
                    "column `{}` is renamed more than once",
                    self.headers[position]
                )));
            }
            renamed.push(position);
            headers[position] = rename.to.clone();
        }

        for &position in &renamed {
            let name = &headers[position];
            if headers.iter().filter(|h| *h == name).count() > 1 {
                return Err(GradeError::Column(format!(
                    "renaming leaves two columns named `{name}`"
                )));
            }
        }

        self.headers = headers;
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).in_file(path)?;
        self.to_writer(file).in_file(path)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn matching_columns(headers: &[String], column: &ColumnMatch) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| column.is_match(h))
        .map(|(i, _)| i)
        .collect()
}

fn find_column(headers: &[String], column: &ColumnMatch) -> Result<usize> {
    match matching_columns(headers, column).as_slice() {
        [single] => Ok(*single),
        [] => Err(GradeError::Column(format!("no column {column}"))),
        many => {
            let names: Vec<&str> = many.iter().map(|&i| headers[i].as_str()).collect();
            Err(GradeError::Column(format!(
                "column {column} is ambiguous: {}",
                names.join(", ")
            )))
        }
    }
}

/// A grade that was written into the sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedGrade {
    pub identifier: String,
    pub name: String,
    pub grade: f64,
    pub source: PathBuf,
}

/// Paths for one merge run.
pub struct MergePaths<'a> {
    pub sheet: &'a Path,
    pub roster_dir: &'a Path,
    pub graded_dir: &'a Path,
    pub output: &'a Path,
}

/// Writes each graded total into the sheet's target column and saves the
/// sheet to `paths.output`.
///
/// Roster files select students: each header gives a name, used to find
/// `<graded_dir>/<name>.txt`, and an identifier, used to find the row.
/// Files that cannot be read are reported in the returned batch. A missing
/// identifier follows `config.missing_identifiers`.
///
/// # Errors
///
/// Fails without writing anything if the output path is the input sheet,
/// the sheet or its columns cannot be resolved, or (under
/// [`MissingIdentifierPolicy::FailFast`]) any identifier is absent.
#[tracing::instrument(skip(rubric, config, paths), fields(sheet = %paths.sheet.display(), output = %paths.output.display()))]
pub fn merge_grades(
    rubric: &Rubric,
    config: &SheetConfig,
    paths: &MergePaths,
) -> Result<BatchReport<MergedGrade>> {
    if same_file(paths.sheet, paths.output) {
        return Err(GradeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "refusing to overwrite the input grade sheet",
        ))
        .in_file(paths.output));
    }

    let mut sheet = GradeSheet::load(paths.sheet, &config.index_column)?;
    let target = sheet.column(&config.target_column).in_file(paths.sheet)?;
    debug!(rows = sheet.len(), target = %sheet.headers()[target], "Grade sheet loaded");

    let mut report = BatchReport::new();
    let mut pending = Vec::new();

    for path in text_files(paths.roster_dir)? {
        if let Some(marker) = config.file_marker.as_deref().filter(|m| !m.is_empty()) {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.contains(marker) {
                debug!(path = %path.display(), "Skipping file without marker");
                continue;
            }
        }

        match read_merge_source(rubric, &path, paths.graded_dir) {
            Ok(merged) if sheet.contains(&merged.identifier) => pending.push(merged),
            Ok(merged) => {
                let error = GradeError::Lookup {
                    identifier: merged.identifier,
                };
                match config.missing_identifiers {
                    MissingIdentifierPolicy::FailFast => return Err(error.in_file(&path)),
                    MissingIdentifierPolicy::Skip => report.fail(&path, error),
                }
            }
            Err(error) => report.fail(&path, error),
        }
    }

    for merged in pending {
        sheet.set(&merged.identifier, target, format!("{:.2}", merged.grade))?;
        report.succeeded.push(merged);
    }

    sheet.rename_columns(&config.renames).in_file(paths.sheet)?;
    if let Some(parent) = paths.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).in_file(parent)?;
    }
    sheet.write(paths.output)?;

    info!(
        merged = report.succeeded.len(),
        failed = report.failed.len(),
        output = %paths.output.display(),
        "Grade sheet written"
    );
    Ok(report)
}

fn read_merge_source(rubric: &Rubric, roster_file: &Path, graded_dir: &Path) -> Result<MergedGrade> {
    let entry = RosterEntry::read(roster_file)?;
    let graded = graded_dir.join(entry.file_name());
    let grade = read_grade(&graded, rubric)?.grade;

    Ok(MergedGrade {
        identifier: entry.identifier,
        name: entry.name,
        grade,
        source: graded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\u{feff}Last Name,First Name,Username,Essay #1 [Total Pts: 100] |316818\n\
        Doe,Jane,jdoe123,\n\
        Lee,Sam,slee7,\n";

    fn sheet() -> GradeSheet {
        GradeSheet::from_reader(SHEET.as_bytes(), "Username").unwrap()
    }

    fn to_text(sheet: &GradeSheet) -> String {
        let mut out = Vec::new();
        sheet.to_writer(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_load_strips_bom_and_indexes() {
        let sheet = sheet();

        assert_eq!(sheet.headers()[0], "Last Name");
        assert_eq!(sheet.len(), 2);
        assert!(sheet.contains("jdoe123"));
        assert!(!sheet.contains("nobody"));
    }

    #[test]
    fn test_missing_index_column() {
        let err = GradeSheet::from_reader(SHEET.as_bytes(), "Student ID").unwrap_err();
        assert!(matches!(err, GradeError::Column(_)));
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let text = "Username,Grade\na,1\na,2\n";
        let err = GradeSheet::from_reader(text.as_bytes(), "Username").unwrap_err();
        assert!(matches!(err, GradeError::Format { line: 3, .. }));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let text = "Username,Grade,Notes\na,1\n";
        let sheet = GradeSheet::from_reader(text.as_bytes(), "Username").unwrap();
        assert_eq!(sheet.get("a", 2), Some(""));
    }

    #[test]
    fn test_set_and_get() {
        let mut sheet = sheet();
        let column = sheet
            .column(&ColumnMatch::Contains("Essay #1".into()))
            .unwrap();

        sheet.set("jdoe123", column, "8.50".into()).unwrap();

        assert_eq!(sheet.get("jdoe123", column), Some("8.50"));
        assert_eq!(sheet.get("slee7", column), Some(""));
    }

    #[test]
    fn test_set_unknown_identifier_is_lookup_error() {
        let mut sheet = sheet();
        let before = to_text(&sheet);

        let err = sheet.set("ghost", 3, "9.00".into()).unwrap_err();

        assert!(matches!(err, GradeError::Lookup { ref identifier } if identifier == "ghost"));
        assert_eq!(to_text(&sheet), before);
    }

    #[test]
    fn test_ambiguous_column_is_error() {
        let sheet = sheet();
        let err = sheet
            .column(&ColumnMatch::Contains("Name".into()))
            .unwrap_err();

        assert!(err.to_string().contains("ambiguous"));
        assert!(err.to_string().contains("Last Name, First Name"));
    }

    #[test]
    fn test_rename_columns() {
        let text = "Last Name (Legal),Username\nDoe,jdoe123\n";
        let mut sheet = GradeSheet::from_reader(text.as_bytes(), "Username").unwrap();

        sheet
            .rename_columns(&[ColumnRename {
                from: ColumnMatch::Contains("Last Name".into()),
                to: "Last Name".into(),
                optional: false,
            }])
            .unwrap();

        assert_eq!(to_text(&sheet), "Last Name,Username\nDoe,jdoe123\n");
    }

    #[test]
    fn test_optional_rename_without_match_is_skipped() {
        let text = "Surname,Username\nDoe,jdoe123\n";
        let mut sheet = GradeSheet::from_reader(text.as_bytes(), "Username").unwrap();
        let mut rename = ColumnRename {
            from: ColumnMatch::Contains("Last Name".into()),
            to: "Last Name".into(),
            optional: true,
        };

        sheet.rename_columns(std::slice::from_ref(&rename)).unwrap();
        assert_eq!(sheet.headers(), &["Surname", "Username"]);

        rename.optional = false;
        let err = sheet.rename_columns(&[rename]).unwrap_err();
        assert!(err.to_string().contains("no column containing `Last Name`"));
    }

    #[test]
    fn test_optional_rename_still_rejects_ambiguity() {
        let mut sheet = sheet();
        let err = sheet
            .rename_columns(&[ColumnRename {
                from: ColumnMatch::Contains("Name".into()),
                to: "Surname".into(),
                optional: true,
            }])
            .unwrap_err();

        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_rename_collision_is_rejected() {
        let mut sheet = sheet();
        let err = sheet
            .rename_columns(&[ColumnRename {
                from: ColumnMatch::Exact("First Name".into()),
                to: "Last Name".into(),
                optional: false,
            }])
            .unwrap_err();

        assert!(err.to_string().contains("two columns named `Last Name`"));
        assert_eq!(sheet.headers()[1], "First Name");
    }

    #[test]
    fn test_write_round_trip_without_bom() {
        assert_eq!(
            to_text(&sheet()),
            "Last Name,First Name,Username,Essay #1 [Total Pts: 100] |316818\n\
             Doe,Jane,jdoe123,\n\
             Lee,Sam,slee7,\n"
        );
    }

    #[test]
    fn test_sheet_config_from_toml() {
        let config: SheetConfig = toml::from_str(
            r#"
            index_column = "Student ID"
            target_column = { contains = "Essay #2" }
            file_marker = "Essay2"
            missing_identifiers = "skip"

            [[renames]]
            match = { exact = "Surname" }
            to = "Last Name"
            "#,
        )
        .unwrap();

        assert_eq!(config.target_column, ColumnMatch::Contains("Essay #2".into()));
        assert_eq!(config.missing_identifiers, MissingIdentifierPolicy::Skip);
        assert_eq!(config.renames[0].from, ColumnMatch::Exact("Surname".into()));
        assert!(!config.renames[0].optional);
    }

    #[test]
    fn test_default_rename_is_optional() {
        let config = SheetConfig::default();
        assert!(config.renames.iter().all(|r| r.optional));
    }
}
