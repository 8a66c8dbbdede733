// SPDX-License-Identifier: AGPL-3.0-or-later
//! Row-level metrics: deviation, limits and verdicts.
//!
//! Every step is a total function over a row. Missing or malformed inputs
//! degrade the affected metric to NA for that row only; nothing here
//! returns an error except a block missing its `Elements` / `Mean`
//! columns, which is a report-shape problem.
//!
//! # Pipeline per row
//!
//! | Step | Rule |
//! |------|------|
//! | element | strip `(%)`, trim, capitalize; base element and blank labels dropped |
//! | censor | mean text containing `<` or `>` → row dropped |
//! | CV | certified value if numeric, else the mean |
//! | DEV | \|cert − mean\|; `-` certificate → \|CV − mean\| = 0; invalid → NA |
//! | limit | mode-specific, see [`TestMode`] |
//! | verdict | NA if metric or limit NA, Pass if metric ≤ limit, else Fail |
//! | %limit | round(metric / limit × 100, 2) |
//!
//! # Report schema
//!
//! Column labels are matched trimmed and case-insensitively:
//! [`COL_ELEMENTS`] and [`COL_MEAN`] are required, [`COL_CERT`] and
//! [`COL_SD`] optional, and any column starting with
//! [`ACCEPTANCE_PREFIX`] is an acceptance band (`2s` / `3s` in the label
//! marks a two- or three-sigma figure).

use crate::error::{Error, Result};
use crate::io::grid::Cell;
use crate::io::reference::{ExclusionList, ThresholdTable};
use crate::limits;
use crate::qc::blocks::SampleBlock;
use serde::Serialize;
use std::fmt;

/// Element symbol column.
pub const COL_ELEMENTS: &str = "Elements";
/// Measured mean column.
pub const COL_MEAN: &str = "Mean";
/// Certified value column.
pub const COL_CERT: &str = "Cert. Val.";
/// Standard deviation column.
pub const COL_SD: &str = "SD";
/// Prefix of acceptance-band columns.
pub const ACCEPTANCE_PREFIX: &str = "Acceptance";

/// Certified-value sentinel meaning "no certified value".
pub const NO_CERTIFIED_VALUE: &str = "-";

// ── Modes and verdicts ───────────────────────────────────────────

/// Verification test mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TestMode {
    /// DEV against the acceptance band.
    Accuracy,
    /// SD against 5% of CV.
    Precision,
    /// DEV against acceptance (or threshold table) × 1.5, 8 sets.
    ShortTermStability,
    /// DEV against acceptance (or threshold table) × 3, 16 sets.
    LongTermStability,
}

impl TestMode {
    /// Parse a CLI mode name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown name.
    pub fn from_arg(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "accuracy" | "a" => Ok(Self::Accuracy),
            "precision" | "p" => Ok(Self::Precision),
            "shortterm" | "short" | "short-term" | "st" => Ok(Self::ShortTermStability),
            "longterm" | "long" | "long-term" | "lt" => Ok(Self::LongTermStability),
            other => Err(Error::InvalidInput(format!("unknown test mode '{other}'"))),
        }
    }

    /// Column tag: `A`, `P` or `S`.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Accuracy => "A",
            Self::Precision => "P",
            Self::ShortTermStability | Self::LongTermStability => "S",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Accuracy => "Accuracy",
            Self::Precision => "Precision",
            Self::ShortTermStability => "ShortTerm",
            Self::LongTermStability => "LongTerm",
        }
    }

    /// Whether this is one of the two stability modes.
    #[must_use]
    pub const fn is_stability(self) -> bool {
        matches!(self, Self::ShortTermStability | Self::LongTermStability)
    }

    /// Exact block count a stability report must contain.
    #[must_use]
    pub const fn required_sets(self) -> Option<usize> {
        match self {
            Self::ShortTermStability => Some(limits::SHORT_TERM_SETS),
            Self::LongTermStability => Some(limits::LONG_TERM_SETS),
            Self::Accuracy | Self::Precision => None,
        }
    }

    /// Multiplier for elements not on the exclusion list.
    #[must_use]
    pub const fn stability_multiplier(self) -> Option<f64> {
        match self {
            Self::ShortTermStability => Some(limits::SHORT_TERM_MULTIPLIER),
            Self::LongTermStability => Some(limits::LONG_TERM_MULTIPLIER),
            Self::Accuracy | Self::Precision => None,
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row or element verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    /// Metric within limit.
    Pass,
    /// Metric beyond limit.
    Fail,
    /// Metric or limit undefined.
    #[serde(rename = "NA")]
    Na,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::Na => "NA",
        })
    }
}

// ── Row model ────────────────────────────────────────────────────

/// Parsed `Cert. Val.` cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CertifiedValue {
    /// Numeric certified value.
    Certified(f64),
    /// The `-` sentinel: no certified value exists.
    Uncertified,
    /// Blank or unparseable.
    Invalid,
}

impl CertifiedValue {
    /// Classify a certified-value cell.
    #[must_use]
    pub fn from_cell(cell: &Cell) -> Self {
        if let Some(v) = cell.to_number() {
            return Self::Certified(v);
        }
        match cell.as_text() {
            Some(text) if text.trim() == NO_CERTIFIED_VALUE => Self::Uncertified,
            _ => Self::Invalid,
        }
    }

    /// Numeric value, if certified.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Certified(v) => Some(v),
            Self::Uncertified | Self::Invalid => None,
        }
    }
}

/// One `Acceptance*` column value.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceBand {
    /// Column label as printed in the report.
    pub label: String,
    /// Raw figure; `-` and text read as `None`.
    pub raw: Option<f64>,
}

impl AcceptanceBand {
    /// One-sigma equivalent: ÷2 for `2s` labels, ÷3 for `3s`, else as-is.
    #[must_use]
    pub fn one_sigma(&self) -> Option<f64> {
        let raw = self.raw?;
        if self.label.contains("2s") {
            Some(raw / limits::TWO_SIGMA_DIVISOR)
        } else if self.label.contains("3s") {
            Some(raw / limits::THREE_SIGMA_DIVISOR)
        } else {
            Some(raw)
        }
    }
}

/// One element measurement of one sample block.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    /// Block ordinal (set number).
    pub set: usize,
    /// Canonical sample name.
    pub sample: String,
    /// Matrix from the marker, if captured.
    pub matrix: Option<String>,
    /// Normalized element symbol.
    pub element: String,
    /// Numeric mean, `None` if not numeric.
    pub mean: Option<f64>,
    /// Mean cell as printed.
    pub mean_text: String,
    /// Certified value classification.
    pub certified: CertifiedValue,
    /// Certified value cell as printed.
    pub certified_text: String,
    /// Standard deviation, `None` if absent or not numeric.
    pub sd: Option<f64>,
    /// Acceptance columns in report order.
    pub acceptance: Vec<AcceptanceBand>,
}

/// Computed fields of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Effective comparison value.
    pub cv: Option<f64>,
    /// Absolute deviation.
    pub dev: Option<f64>,
    /// Resolved limit for the mode (A/P/S).
    pub limit: Option<f64>,
    /// Metric as a percentage of the limit, 2 decimals.
    pub percent: Option<f64>,
    /// Row verdict.
    pub verdict: Verdict,
}

/// A row with its evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedRow {
    /// Input measurement.
    pub row: MeasurementRow,
    /// Computed metrics.
    pub eval: Evaluation,
}

/// Reference inputs a mode needs beyond the row itself.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    /// Test mode.
    pub mode: TestMode,
    /// Stability fallback thresholds.
    pub thresholds: Option<&'a ThresholdTable>,
    /// Stability exclusion list.
    pub exclusions: &'a ExclusionList,
}

// ── Cleaning ─────────────────────────────────────────────────────

/// First character upper-case, the rest lower-case.
#[must_use]
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Normalize an element label: `"pb (%) "` → `"Pb"`.
#[must_use]
pub fn normalize_element(label: &str) -> String {
    capitalize(label.replace("(%)", "").trim())
}

/// Whether a mean cell is a censored placeholder (`<0.01`, `>100`).
#[must_use]
pub fn is_censored(cell: &Cell) -> bool {
    cell.as_text()
        .is_some_and(|text| text.contains('<') || text.contains('>'))
}

/// Clean one block into measurement rows stamped with `sample`.
///
/// Drops blank-element rows, rows of the `base` element and censored means.
///
/// # Errors
///
/// Returns [`Error::MissingColumn`] if the block has data rows but no
/// `Elements` or `Mean` column.
pub fn extract_rows(block: &SampleBlock, sample: &str, base: &str) -> Result<Vec<MeasurementRow>> {
    if block.rows.is_empty() {
        return Ok(Vec::new());
    }
    let missing = |column| Error::MissingColumn {
        sample: block.sample_name.clone(),
        column,
    };
    let element_col = block.column(COL_ELEMENTS).ok_or_else(|| missing(COL_ELEMENTS))?;
    let mean_col = block.column(COL_MEAN).ok_or_else(|| missing(COL_MEAN))?;
    let cert_col = block.column(COL_CERT);
    let sd_col = block.column(COL_SD);
    let acceptance_cols = block.columns_with_prefix(ACCEPTANCE_PREFIX);
    let base = normalize_element(base);
    let no_cert = Cell::Empty;

    let mut rows = Vec::with_capacity(block.rows.len());
    let mut dropped = 0_usize;
    for i in 0..block.rows.len() {
        let element = normalize_element(&block.cell(i, element_col).to_string());
        let mean_cell = block.cell(i, mean_col);
        if element.is_empty() || element == base || is_censored(mean_cell) {
            dropped += 1;
            continue;
        }
        let cert_cell = cert_col.map_or(&no_cert, |c| block.cell(i, c));
        rows.push(MeasurementRow {
            set: block.ordinal,
            sample: sample.to_string(),
            matrix: block.matrix.clone(),
            element,
            mean: mean_cell.to_number(),
            mean_text: mean_cell.to_string(),
            certified: CertifiedValue::from_cell(cert_cell),
            certified_text: cert_cell.to_string(),
            sd: sd_col.and_then(|c| block.cell(i, c).to_number()),
            acceptance: acceptance_cols
                .iter()
                .map(|&c| AcceptanceBand {
                    label: block.headers[c].clone(),
                    raw: block.cell(i, c).to_number(),
                })
                .collect(),
        });
    }
    if dropped > 0 {
        tracing::debug!(sample, dropped, kept = rows.len(), "dropped base/censored rows");
    }
    Ok(rows)
}

// ── Metrics ──────────────────────────────────────────────────────

/// Effective comparison value: certified value if numeric, else the mean.
#[must_use]
pub fn comparison_value(row: &MeasurementRow) -> Option<f64> {
    row.certified.value().or(row.mean)
}

/// Absolute deviation between certified value (or its CV stand-in for the
/// `-` sentinel) and the mean.
#[must_use]
pub fn deviation(row: &MeasurementRow) -> Option<f64> {
    let mean = row.mean?;
    match row.certified {
        CertifiedValue::Certified(cert) => Some((cert - mean).abs()),
        CertifiedValue::Uncertified => comparison_value(row).map(|cv| (cv - mean).abs()),
        CertifiedValue::Invalid => None,
    }
}

/// First non-missing acceptance band, normalized to one sigma.
#[must_use]
pub fn acceptance_limit(bands: &[AcceptanceBand]) -> Option<f64> {
    bands.iter().find_map(AcceptanceBand::one_sigma)
}

/// Precision limit: CV × [`limits::PRECISION_FRACTION`].
#[must_use]
pub fn precision_limit(cv: Option<f64>) -> Option<f64> {
    cv.map(|cv| cv * limits::PRECISION_FRACTION)
}

/// Stability limit: acceptance band, else threshold-table band, scaled by
/// the exclusion multiplier or the mode multiplier.
#[must_use]
pub fn stability_limit(row: &MeasurementRow, cv: Option<f64>, ctx: &MetricContext<'_>) -> Option<f64> {
    let base = acceptance_limit(&row.acceptance).or_else(|| {
        let table = ctx.thresholds?;
        table.lookup(cv?, &row.element)
    })?;
    let multiplier = if ctx.exclusions.contains(&row.element) {
        limits::EXCLUDED_ELEMENT_MULTIPLIER
    } else {
        ctx.mode.stability_multiplier()?
    };
    Some(base * multiplier)
}

/// Verdict for `metric` against `limit`.
#[must_use]
pub fn verdict(metric: Option<f64>, limit: Option<f64>) -> Verdict {
    match (metric, limit) {
        (Some(m), Some(l)) if m <= l => Verdict::Pass,
        (Some(_), Some(_)) => Verdict::Fail,
        _ => Verdict::Na,
    }
}

/// Round to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

/// `metric / limit × 100`, rounded; `None` if undefined or not finite.
#[must_use]
pub fn percent_of_limit(metric: Option<f64>, limit: Option<f64>) -> Option<f64> {
    let pct = metric? / limit? * 100.0;
    pct.is_finite()
        .then(|| round_to(pct, limits::PERCENT_DECIMALS))
}

/// Evaluate one row under `ctx.mode`.
#[must_use]
pub fn evaluate(row: &MeasurementRow, ctx: &MetricContext<'_>) -> Evaluation {
    let cv = comparison_value(row);
    let dev = deviation(row);
    let (metric, limit) = match ctx.mode {
        TestMode::Accuracy => (dev, acceptance_limit(&row.acceptance)),
        TestMode::Precision => (row.sd, precision_limit(cv)),
        TestMode::ShortTermStability | TestMode::LongTermStability => {
            (dev, stability_limit(row, cv, ctx))
        }
    };
    Evaluation {
        cv,
        dev,
        limit,
        percent: percent_of_limit(metric, limit),
        verdict: verdict(metric, limit),
    }
}

/// Evaluate every row, keeping input order.
#[must_use]
pub fn evaluate_rows(rows: Vec<MeasurementRow>, ctx: &MetricContext<'_>) -> Vec<EvaluatedRow> {
    rows.into_iter()
        .map(|row| {
            let eval = evaluate(&row, ctx);
            EvaluatedRow { row, eval }
        })
        .collect()
}
