// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workbook decoding via `calamine` (xlsx, xlsm, xlsb, xls, ods).
//!
//! Every worksheet is flattened to a [`ReportGrid`] in absolute worksheet
//! coordinates: `calamine` ranges start at the first used cell, so leading
//! empty rows and columns are padded back in. Block detection relies on
//! the marker sitting in the first column.

use crate::error::{Error, Result};
use crate::io::grid::{Cell, ReportGrid};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

/// An opened workbook, read one sheet at a time.
pub struct Workbook<RS: Read + Seek> {
    sheets: Sheets<RS>,
    origin: String,
}

impl Workbook<std::io::BufReader<std::fs::File>> {
    /// Open a workbook from disk; the format is detected from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file does not exist and
    /// [`Error::Workbook`] if it cannot be decoded.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "workbook not found"),
            });
        }
        let sheets = open_workbook_auto(path)
            .map_err(|e| Error::Workbook(format!("{}: {e}", path.display())))?;
        Ok(Self {
            sheets,
            origin: path.display().to_string(),
        })
    }
}

impl Workbook<Cursor<Vec<u8>>> {
    /// Decode an uploaded workbook held in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workbook`] if the bytes are not a supported workbook.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        Ok(Self {
            sheets,
            origin: String::from("<upload>"),
        })
    }
}

impl<RS: Read + Seek> Workbook<RS> {
    /// Sheet names in workbook order.
    #[must_use]
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Read the named sheet as a grid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReference`] if no sheet has this name and
    /// [`Error::Workbook`] if the sheet cannot be decoded.
    pub fn sheet(&mut self, name: &str) -> Result<ReportGrid> {
        if !self.sheet_names().iter().any(|s| s == name) {
            return Err(Error::MissingReference(format!(
                "sheet '{name}' not found in {}",
                self.origin
            )));
        }
        let range = self
            .sheets
            .worksheet_range(name)
            .map_err(|e| Error::Workbook(format!("{} [{name}]: {e}", self.origin)))?;
        Ok(range_to_grid(&range))
    }

    /// Read the first sheet as a grid (reports carry a single sheet).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workbook`] if the workbook has no sheet or the sheet
    /// cannot be decoded.
    pub fn first_sheet(&mut self) -> Result<ReportGrid> {
        let name = self
            .sheet_names()
            .into_iter()
            .next()
            .ok_or_else(|| Error::Workbook(format!("{} has no worksheets", self.origin)))?;
        self.sheet(&name)
    }
}

/// Flatten a `calamine` range to a grid in absolute sheet coordinates.
#[must_use]
pub fn range_to_grid(range: &Range<Data>) -> ReportGrid {
    let Some((start_row, start_col)) = range.start() else {
        return ReportGrid::default();
    };
    let lead_cols = start_col as usize;
    let mut rows: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    for source in range.rows() {
        let mut row = Vec::with_capacity(lead_cols + source.len());
        row.resize(lead_cols, Cell::Empty);
        row.extend(source.iter().map(cell_from_data));
        rows.push(row);
    }
    ReportGrid::from_rows(rows)
}

#[allow(clippy::cast_precision_loss)]
fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::String(s) => Cell::text(s),
        other => Cell::text(&other.to_string()),
    }
}
