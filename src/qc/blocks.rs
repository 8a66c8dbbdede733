// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample-block scanner for semi-structured instrument reports.
//!
//! Instrument exports are a flat grid of repeated blocks:
//!
//! ```text
//! Sample Name: CRM-1 | Matrix: M1 | Date: 2026-03-02     ← marker row
//! Elements | Mean | SD | Cert. Val. | Acceptance-2s      ← header row
//! Pb (%)   | 10.0 | .. | 10.2       | 0.8                ← data rows
//! Cu (%)   | ...
//!                                                        ← empty row ends block
//! ```
//!
//! [`BlockScanner`] walks the rows with an explicit three-state machine
//! (`SeekingMarker` → `ReadingHeader` → `ReadingRows`) and never touches
//! the source grid. A marker row is any row whose first cell is text
//! containing `Sample Name`. A block ends at a fully-empty row or at the end
//! of the grid; a marker row inside an open block is read as data.

use crate::error::{Error, Result};
use crate::io::grid::{row_is_empty, Cell, ReportGrid};

/// Literal token identifying a marker row.
pub const MARKER_TOKEN: &str = "Sample Name";

/// Pipe position of the matrix field in stability markers
/// (`Sample Name: X | Matrix: M1 | ...`).
pub const MATRIX_FIELD_POSITION: usize = 1;

static EMPTY_CELL: Cell = Cell::Empty;

/// One marker-delimited sample table.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// 1-based order of the marker in the report (the set number).
    pub ordinal: usize,
    /// Grid row index of the marker.
    pub marker_row: usize,
    /// Sample name from the marker (possibly empty), or `Sample_<ordinal>`
    /// when the marker has no `sample name:` segment.
    pub sample_name: String,
    /// Matrix from the marker, when matrix extraction is enabled.
    pub matrix: Option<String>,
    /// Trimmed header labels.
    pub headers: Vec<String>,
    /// Data rows, aligned to `headers` by position.
    pub rows: Vec<Vec<Cell>>,
}

impl SampleBlock {
    /// Position of the column labelled `label` (trimmed, case-insensitive).
    #[must_use]
    pub fn column(&self, label: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(label.trim()))
    }

    /// Columns whose label starts with `prefix` (case-insensitive), in
    /// report order.
    #[must_use]
    pub fn columns_with_prefix(&self, prefix: &str) -> Vec<usize> {
        let prefix = prefix.to_ascii_lowercase();
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.to_ascii_lowercase().starts_with(&prefix))
            .map(|(i, _)| i)
            .collect()
    }

    /// Cell at (`row`, `col`); short rows read as empty.
    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Identity captured from a marker row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerFields {
    /// Sample name, if a `sample name:` segment was present.
    pub sample_name: Option<String>,
    /// Matrix, if requested and present at [`MATRIX_FIELD_POSITION`].
    pub matrix: Option<String>,
}

/// Whether `row` is a marker row.
#[must_use]
pub fn is_marker_row(row: &[Cell]) -> bool {
    row.first()
        .and_then(Cell::as_text)
        .is_some_and(|text| text.contains(MARKER_TOKEN))
}

/// Split a marker cell into its identity fields.
///
/// The sample name is the trimmed value of the first `|` segment whose key
/// contains `sample name` (case-insensitive) and that has a `:`; an empty
/// value is kept as an empty name. The matrix is read from the segment at
/// [`MATRIX_FIELD_POSITION`] when `with_matrix` is set, and must be
/// non-blank.
#[must_use]
pub fn parse_marker(text: &str, with_matrix: bool) -> MarkerFields {
    let segments: Vec<&str> = text.split('|').collect();
    let sample_name = segments.iter().find_map(|segment| {
        if !segment.to_lowercase().contains("sample name") {
            return None;
        }
        segment_value(segment)
    });
    let matrix = if with_matrix {
        segments
            .get(MATRIX_FIELD_POSITION)
            .and_then(|segment| segment_value(segment))
            .filter(|v| !v.is_empty())
    } else {
        None
    };
    MarkerFields {
        sample_name,
        matrix,
    }
}

/// Value after the first `:` in a `key:value` segment, trimmed.
fn segment_value(segment: &str) -> Option<String> {
    segment.split(':').nth(1).map(|v| v.trim().to_string())
}

enum ScanState {
    SeekingMarker,
    ReadingHeader(SampleBlock),
    ReadingRows(SampleBlock),
}

/// Finite-state block scanner over a [`ReportGrid`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockScanner {
    with_matrix: bool,
}

impl BlockScanner {
    /// Scanner that captures sample names only.
    #[must_use]
    pub const fn new() -> Self {
        Self { with_matrix: false }
    }

    /// Also capture the matrix field from each marker (stability reports).
    #[must_use]
    pub const fn with_matrix(mut self, enabled: bool) -> Self {
        self.with_matrix = enabled;
        self
    }

    /// Every block in the grid, in report order. May be empty.
    #[must_use]
    pub fn scan(&self, grid: &ReportGrid) -> Vec<SampleBlock> {
        let mut blocks = Vec::new();
        let mut state = ScanState::SeekingMarker;
        let mut markers_seen = 0_usize;

        for (index, row) in grid.rows().iter().enumerate() {
            state = match state {
                ScanState::ReadingHeader(mut block) => {
                    block.headers = row
                        .iter()
                        .map(|c| c.to_string().trim().to_string())
                        .collect();
                    ScanState::ReadingRows(block)
                }
                ScanState::ReadingRows(mut block) => {
                    if row_is_empty(row) {
                        blocks.push(block);
                        ScanState::SeekingMarker
                    } else {
                        block.rows.push(row.clone());
                        ScanState::ReadingRows(block)
                    }
                }
                ScanState::SeekingMarker => {
                    if is_marker_row(row) {
                        markers_seen += 1;
                        ScanState::ReadingHeader(self.open_block(row, index, markers_seen))
                    } else {
                        ScanState::SeekingMarker
                    }
                }
            };
        }

        match state {
            ScanState::ReadingHeader(block) | ScanState::ReadingRows(block) => blocks.push(block),
            ScanState::SeekingMarker => {}
        }

        tracing::debug!(blocks = blocks.len(), rows = grid.len(), "scanned report grid");
        blocks
    }

    /// Like [`Self::scan`], but a report without any block is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSampleBlocks`] if no marker row is found.
    pub fn parse(&self, grid: &ReportGrid) -> Result<Vec<SampleBlock>> {
        let blocks = self.scan(grid);
        if blocks.is_empty() {
            return Err(Error::NoSampleBlocks);
        }
        Ok(blocks)
    }

    fn open_block(&self, row: &[Cell], index: usize, ordinal: usize) -> SampleBlock {
        let text = row.first().and_then(Cell::as_text).unwrap_or_default();
        let fields = parse_marker(text, self.with_matrix);
        SampleBlock {
            ordinal,
            marker_row: index,
            sample_name: fields
                .sample_name
                .unwrap_or_else(|| format!("Sample_{ordinal}")),
            matrix: fields.matrix,
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }
}
