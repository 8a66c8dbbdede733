// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unheadered 2-D cell grid: the raw shape of an instrument report.
//!
//! A report is read without assuming any header row: the first worksheet
//! of a workbook (see [`crate::io::workbook`]) or a delimited text export
//! becomes a [`ReportGrid`] of [`Cell`] values. Rows keep their original
//! position, so fully-empty separator rows survive for the block scanner.
//!
//! # Delimited text
//!
//! ```text
//! Sample Name: CRM-1 | Matrix: M1
//! Elements,Mean,Cert. Val.,SD,Acceptance-2s
//! Pb (%),10.0,10.2,0.05,0.8
//!
//! ```
//!
//! Fields are split on the delimiter with RFC 4180 double-quote handling;
//! each field is coerced with [`Cell::parse`].

use crate::error::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// No value (also used for whitespace-only text).
    Empty,
    /// Numeric value.
    Number(f64),
    /// Any non-numeric text, kept verbatim.
    Text(String),
}

impl Cell {
    /// Coerce a raw text field: blank → `Empty`, numeric → `Number`,
    /// anything else → `Text`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Number(v),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Wrap text without numeric coercion; blank text becomes `Empty`.
    #[must_use]
    pub fn text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(raw.to_string())
        }
    }

    /// True for `Empty` and whitespace-only text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Number(_) => false,
            Self::Text(s) => s.trim().is_empty(),
        }
    }

    /// Borrow the text of a `Text` cell.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Empty | Self::Number(_) => None,
        }
    }

    /// Numeric value with to-numeric coercion: numbers pass through, text
    /// that parses as a finite `f64` is converted, everything else is `None`.
    #[must_use]
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Self::Number(_) | Self::Empty => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Cell {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// The uploaded report as rows of cells. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportGrid {
    rows: Vec<Vec<Cell>>,
}

impl ReportGrid {
    /// Build a grid from already-decoded rows.
    #[must_use]
    pub const fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// All rows in report order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Row at `index`, if any.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Number of rows, empty separators included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the grid has no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse delimited text held in memory.
    #[must_use]
    pub fn from_delimited(text: &str, delimiter: char) -> Self {
        let rows = text
            .lines()
            .map(|line| split_delimited(line, delimiter))
            .collect();
        Self { rows }
    }

    /// Parse a delimited text file, streaming it line by line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or a line cannot
    /// be read.
    pub fn from_delimited_path(path: &Path, delimiter: char) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        for line_result in reader.lines() {
            let line = line_result.map_err(|e| Error::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            rows.push(split_delimited(&line, delimiter));
        }
        Ok(Self { rows })
    }
}

/// True when every cell of `row` is empty (a zero-width row counts).
#[must_use]
pub fn row_is_empty(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_empty)
}

/// Split one line on `delimiter`, honouring double-quoted fields.
fn split_delimited(line: &str, delimiter: char) -> Vec<Cell> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut cells = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            } else {
                field.push(c);
            }
        } else if c == '"' && field.trim().is_empty() {
            field.clear();
            quoted = true;
            was_quoted = true;
        } else if c == delimiter {
            cells.push(finish_field(&field, was_quoted));
            field.clear();
            was_quoted = false;
        } else {
            field.push(c);
        }
    }
    if !line.is_empty() {
        cells.push(finish_field(&field, was_quoted));
    }
    cells
}

fn finish_field(field: &str, was_quoted: bool) -> Cell {
    if was_quoted {
        Cell::text(field)
    } else {
        Cell::parse(field)
    }
}
