//! Student identity from a submission's header line.
//!
//! Header lines look like `Name: Jane Doe (jdoe123) submitted 9/14`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{GradeError, InFile, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub name: String,
    pub identifier: String,
}

impl RosterEntry {
    /// Parses `<label>: <Name> (<Identifier>)<trailing text>`.
    ///
    /// # Errors
    ///
    /// Returns [`GradeError::Format`] (line 1) if the colon or either
    /// parenthesis is missing, if `(` comes before the colon, or if the name
    /// or identifier is empty.
    pub fn parse_header(line: &str) -> Result<Self> {
        let colon = line
            .find(':')
            .ok_or_else(|| GradeError::format(1, "header has no `:`"))?;
        let open = line
            .find('(')
            .ok_or_else(|| GradeError::format(1, "header has no `(`"))?;
        if open < colon {
            return Err(GradeError::format(1, "header has `(` before `:`"));
        }
        let close = line[open..]
            .find(')')
            .map(|offset| open + offset)
            .ok_or_else(|| GradeError::format(1, "header has no `)` after `(`"))?;

        let name = line[colon + 1..open].trim();
        let identifier = line[open + 1..close].trim();

        if name.is_empty() {
            return Err(GradeError::format(1, "header has an empty name"));
        }
        if identifier.is_empty() {
            return Err(GradeError::format(1, "header has an empty identifier"));
        }
        if name.contains(['/', '\\']) {
            return Err(GradeError::format(
                1,
                format!("name `{name}` contains a path separator"),
            ));
        }

        Ok(RosterEntry {
            name: name.to_string(),
            identifier: identifier.to_string(),
        })
    }

    /// Reads the header from the first line of a roster file.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).in_file(path)?;
        let mut first = String::new();
        BufReader::new(file).read_line(&mut first).in_file(path)?;
        Self::parse_header(first.trim_end_matches(['\r', '\n'])).in_file(path)
    }

    /// File name of this student's evaluation file.
    pub fn file_name(&self) -> String {
        format!("{}.txt", self.name)
    }
}

impl FromStr for RosterEntry {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_header(s)
    }
}
