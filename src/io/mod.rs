// SPDX-License-Identifier: AGPL-3.0-or-later
//! Readers for instrument reports and reference tables.
//!
//! Reports arrive either as spreadsheet workbooks (first sheet is used) or
//! as delimited text; both are flattened into a [`grid::ReportGrid`] before
//! any block scanning happens.

pub mod grid;
pub mod reference;
pub mod workbook;

use crate::error::{Error, Result};
use grid::ReportGrid;
use std::path::Path;

/// How a report file is decoded, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// xlsx / xlsm / xlsb / xls / ods.
    Workbook,
    /// Delimited text with the given separator.
    Delimited(char),
}

impl ReportFormat {
    /// Format for `path`'s extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a missing or unsupported extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(Self::Workbook),
            "csv" => Ok(Self::Delimited(',')),
            "tsv" | "txt" => Ok(Self::Delimited('\t')),
            _ => Err(Error::InvalidInput(format!(
                "unsupported report format: {}",
                path.display()
            ))),
        }
    }
}

/// Read a report file into a grid.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an unknown extension, and I/O or
/// workbook errors from the underlying reader.
pub fn read_report(path: &Path) -> Result<ReportGrid> {
    let grid = match ReportFormat::from_path(path)? {
        ReportFormat::Workbook => workbook::Workbook::open(path)?.first_sheet()?,
        ReportFormat::Delimited(delimiter) => ReportGrid::from_delimited_path(path, delimiter)?,
    };
    tracing::info!(path = %path.display(), rows = grid.len(), "read report");
    Ok(grid)
}
