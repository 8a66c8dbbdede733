// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static reference data: expected samples, stability thresholds and the
//! exclusion list.
//!
//! All three tables are read-only for the duration of a run and are passed
//! explicitly into [`crate::qc::run`]; nothing here is cached globally.
//!
//! # Layouts
//!
//! Expected-sample database: one sheet per base, one column per matrix:
//!
//! ```text
//! | M1     | M2     |
//! | CRM-1  | CRM-7  |
//! | CRM-2  |        |
//! ```
//!
//! Threshold table: one workbook per model, one sheet per base; the first
//! column holds ascending certified-value bands, the rest one column per
//! element:
//!
//! ```text
//! | Cert. Val. | Pb   | Cu   |
//! | 1.0        | 0.05 | 0.04 |
//! | 10.0       | 0.20 | 0.15 |
//! ```
//!
//! Exclusion list: element symbols separated by commas, semicolons or
//! whitespace; lines starting with `#` are comments.

use crate::error::{Error, Result};
use crate::io::grid::{Cell, ReportGrid};
use crate::io::workbook::Workbook;
use crate::qc::metrics::normalize_element;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ── Expected-sample database ─────────────────────────────────────

/// Expected reference samples per (base, matrix).
#[derive(Debug, Clone, Default)]
pub struct SampleDatabase {
    bases: BTreeMap<String, Vec<(String, Vec<String>)>>,
}

impl SampleDatabase {
    /// Empty database; populate with [`Self::insert_sheet`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every sheet of the database workbook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] / [`Error::Workbook`] if the workbook cannot be
    /// read.
    pub fn load(path: &Path) -> Result<Self> {
        let mut workbook = Workbook::open(path)?;
        let mut db = Self::new();
        for base in workbook.sheet_names() {
            let grid = workbook.sheet(&base)?;
            db.insert_sheet(&base, &grid);
        }
        tracing::debug!(path = %path.display(), bases = db.bases.len(), "loaded sample database");
        Ok(db)
    }

    /// Register one base sheet: row 0 names the matrices, cells below are
    /// sample names. Blank header columns and blank cells are skipped.
    pub fn insert_sheet(&mut self, base: &str, grid: &ReportGrid) {
        let Some(header) = grid.row(0) else {
            self.bases.insert(base.to_string(), Vec::new());
            return;
        };
        let mut matrices = Vec::new();
        for (col, label) in header.iter().enumerate() {
            let matrix = label.to_string().trim().to_string();
            if matrix.is_empty() {
                continue;
            }
            let samples: Vec<String> = grid.rows()[1..]
                .iter()
                .filter_map(|row| row.get(col))
                .filter(|cell| !cell.is_empty())
                .map(|cell| cell.to_string().trim().to_string())
                .collect();
            matrices.push((matrix, samples));
        }
        self.bases.insert(base.to_string(), matrices);
    }

    /// Base names in sorted order.
    pub fn bases(&self) -> impl Iterator<Item = &str> {
        self.bases.keys().map(String::as_str)
    }

    /// Matrix names of one base, in sheet column order.
    pub fn matrices(&self, base: &str) -> impl Iterator<Item = &str> {
        self.bases
            .get(base)
            .into_iter()
            .flatten()
            .map(|(m, _)| m.as_str())
    }

    /// Expected sample names for (base, matrix).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReference`] if the base sheet or the matrix
    /// column does not exist.
    pub fn expected(&self, base: &str, matrix: &str) -> Result<&[String]> {
        let matrices = self
            .bases
            .get(base)
            .ok_or_else(|| Error::MissingReference(format!("no sample sheet for base '{base}'")))?;
        matrices
            .iter()
            .find(|(m, _)| m == matrix)
            .map(|(_, samples)| samples.as_slice())
            .ok_or_else(|| {
                Error::MissingReference(format!(
                    "no matrix column '{matrix}' for base '{base}'"
                ))
            })
    }
}

// ── Stability threshold table ────────────────────────────────────

/// Certified-value-banded stability thresholds for one (model, base).
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    elements: Vec<String>,
    bands: Vec<(f64, Vec<Option<f64>>)>,
}

impl ThresholdTable {
    /// Build from a sheet grid: header row first, band value in column 0.
    /// Rows whose band cell is not numeric are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReference`] if the grid has no header row.
    pub fn from_grid(grid: &ReportGrid) -> Result<Self> {
        let header = grid
            .row(0)
            .ok_or_else(|| Error::MissingReference("threshold table has no header row".into()))?;
        let elements: Vec<String> = header
            .iter()
            .skip(1)
            .map(|c| normalize_element(&c.to_string()))
            .collect();
        let bands = grid.rows()[1..]
            .iter()
            .filter_map(|row| {
                let band = row.first().and_then(Cell::to_number)?;
                let values = (0..elements.len())
                    .map(|i| row.get(i + 1).and_then(Cell::to_number))
                    .collect();
                Some((band, values))
            })
            .collect();
        Ok(Self { elements, bands })
    }

    /// Load the sheet named after `base` from a model's threshold workbook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] / [`Error::Workbook`] if the workbook cannot be
    /// read and [`Error::MissingReference`] if the sheet does not exist.
    pub fn load(path: &Path, base: &str) -> Result<Self> {
        let mut workbook = Workbook::open(path)?;
        let grid = workbook.sheet(base)?;
        let table = Self::from_grid(&grid)?;
        tracing::debug!(
            path = %path.display(),
            base,
            bands = table.bands.len(),
            elements = table.elements.len(),
            "loaded threshold table"
        );
        Ok(table)
    }

    /// Threshold for `element` at comparison value `cv`.
    ///
    /// Picks the first band, in table order, whose band value is ≥ `cv`
    /// (a step function, no interpolation). `None` if `cv` exceeds every
    /// band, the element has no column, or the cell is blank.
    #[must_use]
    pub fn lookup(&self, cv: f64, element: &str) -> Option<f64> {
        let key = normalize_element(element);
        let col = self.elements.iter().position(|e| *e == key)?;
        let (_, values) = self.bands.iter().find(|(band, _)| *band >= cv)?;
        values.get(col).copied().flatten()
    }

    /// Number of bands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// True when no band rows were read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

// ── Exclusion list ───────────────────────────────────────────────

/// Elements that always take the fixed ×3 stability multiplier.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    elements: BTreeSet<String>,
}

impl ExclusionList {
    /// Parse flat delimited text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let elements = text
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .flat_map(|line| line.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
            .filter(|token| !token.trim().is_empty())
            .map(normalize_element)
            .collect();
        Self { elements }
    }

    /// Read and parse an exclusion list file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::parse(&text))
    }

    /// Whether `element` (any spelling) is excluded.
    #[must_use]
    pub fn contains(&self, element: &str) -> bool {
        self.elements.contains(&normalize_element(element))
    }

    /// Number of excluded elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

// ── Bundle ───────────────────────────────────────────────────────

/// Reference tables threaded through a run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    /// Expected samples per (base, matrix).
    pub samples: SampleDatabase,
    /// Stability fallback thresholds for the run's (model, base), if loaded.
    pub thresholds: Option<ThresholdTable>,
    /// Exclusion list for the stability multiplier.
    pub exclusions: ExclusionList,
}
