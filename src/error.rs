// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for report parsing, reference loading and verification runs.
//!
//! Only structural problems surface here. Row-level data problems never become errors; they degrade the affected
//! metric to NA (see [`crate::qc::metrics`]).

use std::fmt;
use std::path::PathBuf;

/// Errors produced by APS parsers and verification runs.
#[derive(Debug)]
pub enum Error {
    /// File I/O error with path context.
    Io {
        /// Path that caused the error.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Workbook decoding error (xlsx / xls / ods container or sheet).
    Workbook(String),
    /// Session or report JSON (de)serialization error.
    Json(String),
    /// The report contains no marker-delimited sample block.
    NoSampleBlocks,
    /// A stability run did not contain exactly the required number of sets.
    SetCountMismatch {
        /// Stability flavour label (`ShortTerm` / `LongTerm`).
        mode: &'static str,
        /// Sets the mode requires.
        expected: usize,
        /// Blocks found in the report.
        found: usize,
    },
    /// A sample block with data rows lacks a required column.
    MissingColumn {
        /// Sample name from the block's marker row.
        sample: String,
        /// Column label that was not found.
        column: &'static str,
    },
    /// A required reference table, sheet or column is absent.
    MissingReference(String),
    /// Unresolved expected samples still lack a manual decision.
    UnresolvedSamples(Vec<String>),
    /// Invalid input parameters (unknown mode, unknown sample, bad flag).
    InvalidInput(String),
}

/// Result type alias for APS operations.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Workbook(msg) => write!(f, "workbook error: {msg}"),
            Self::Json(msg) => write!(f, "JSON error: {msg}"),
            Self::NoSampleBlocks => write!(f, "no valid sample data found in report"),
            Self::SetCountMismatch {
                mode,
                expected,
                found,
            } => write!(
                f,
                "set count mismatch: {mode} stability requires {expected} sets, found {found}"
            ),
            Self::MissingColumn { sample, column } => {
                write!(f, "missing column: sample '{sample}' has no '{column}' column")
            }
            Self::MissingReference(msg) => write!(f, "missing reference data: {msg}"),
            Self::UnresolvedSamples(names) => {
                write!(f, "unresolved samples need a mapping: {}", names.join(", "))
            }
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Workbook(_)
            | Self::Json(_)
            | Self::NoSampleBlocks
            | Self::SetCountMismatch { .. }
            | Self::MissingColumn { .. }
            | Self::MissingReference(_)
            | Self::UnresolvedSamples(_)
            | Self::InvalidInput(_) => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<calamine::Error> for Error {
    fn from(err: calamine::Error) -> Self {
        Self::Workbook(err.to_string())
    }
}
