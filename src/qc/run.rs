// SPDX-License-Identifier: AGPL-3.0-or-later
//! Verification run orchestration.
//!
//! A run is two-phase so identity ambiguity never blocks on a prompt:
//!
//! ```text
//!   stage(ctx, grid, refs)          blocks, set-count gate, auto-matching
//!        │
//!        ├─ resolution() ─────────► caller inspects Pending, decides
//!        │
//!   finish(decisions)               relabel, metrics, per-element rollup
//!        │
//!        ▼
//!   RunReport
//! ```
//!
//! The run context and reference tables are passed in explicitly; the run
//! holds no state beyond the staged blocks.

use crate::error::{Error, Result};
use crate::io::grid::ReportGrid;
use crate::io::reference::ReferenceData;
use crate::qc::aggregate::{
    element_totals, row_totals, summarize, ElementSummary, ElementTotals, RowTotals,
};
use crate::qc::blocks::{BlockScanner, SampleBlock};
use crate::qc::identity::{
    normalize_sample_name, resolve_identities, ManualChoice, MappingEntry, Resolution,
    SampleMapping,
};
use crate::qc::metrics::{evaluate_rows, extract_rows, EvaluatedRow, MetricContext, TestMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Who ran what, on which instrument and reference selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunContext {
    /// Operator name.
    pub operator: String,
    /// Bench / instrument identifier.
    pub bench_no: String,
    /// Base (dominant element) of the reference material.
    pub base: String,
    /// Matrix within the base; selects the expected sample list.
    pub matrix: String,
    /// Instrument model; selects the stability threshold workbook.
    pub model: String,
    /// Last standardization date, as entered.
    pub last_standardization: Option<String>,
    /// Test mode.
    pub mode: TestMode,
}

impl RunContext {
    /// Minimal context for library callers that have no operator metadata.
    #[must_use]
    pub fn new(base: &str, matrix: &str, model: &str, mode: TestMode) -> Self {
        Self {
            operator: String::new(),
            bench_no: String::new(),
            base: base.to_string(),
            matrix: matrix.to_string(),
            model: model.to_string(),
            last_standardization: None,
            mode,
        }
    }
}

/// Non-fatal findings surfaced alongside the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// Detected blocks differ from the expected sample count.
    SampleCountMismatch {
        /// Expected samples for (base, matrix).
        expected: usize,
        /// Blocks found in the report.
        found: usize,
    },
    /// An expected sample has no imported counterpart.
    ExpectedSampleMissing {
        /// Expected sample name.
        sample: String,
    },
    /// An imported sample maps to no expected sample.
    UnmappedImportedSample {
        /// Normalized imported name.
        sample: String,
    },
    /// A stability set's marker names a different matrix than selected.
    MatrixMismatch {
        /// Set number.
        set: usize,
        /// Matrix read from the marker.
        found: String,
    },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SampleCountMismatch { expected, found } => write!(
                f,
                "expected {expected} samples, but found {found} samples"
            ),
            Self::ExpectedSampleMissing { sample } => {
                write!(f, "expected sample '{sample}' not found in report")
            }
            Self::UnmappedImportedSample { sample } => {
                write!(f, "report sample '{sample}' is not in the reference list")
            }
            Self::MatrixMismatch { set, found } => {
                write!(f, "set {set} reports matrix '{found}'")
            }
        }
    }
}

/// Everything a finished run hands to the output sink.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run context (its `mode` is the evaluated mode).
    pub context: RunContext,
    /// Sample blocks detected.
    pub blocks_found: usize,
    /// Expected samples for (base, matrix).
    pub expected_samples: usize,
    /// Row-level results in report order.
    pub rows: Vec<EvaluatedRow>,
    /// Element-level rollup.
    pub summary: Vec<ElementSummary>,
    /// Element verdict counts.
    pub element_totals: ElementTotals,
    /// Row verdict counts.
    pub row_totals: RowTotals,
    /// Expected → imported mapping table.
    pub mapping: Vec<MappingEntry>,
    /// Non-fatal findings.
    pub warnings: Vec<RunWarning>,
}

/// Enforce the stability set count for `mode`.
///
/// # Errors
///
/// Returns [`Error::SetCountMismatch`] when a stability mode does not get
/// exactly its required number of blocks.
pub fn check_set_count(mode: TestMode, found: usize) -> Result<()> {
    match mode.required_sets() {
        Some(expected) if expected != found => Err(Error::SetCountMismatch {
            mode: mode.label(),
            expected,
            found,
        }),
        _ => Ok(()),
    }
}

/// A parsed, gated report awaiting identity decisions.
#[derive(Debug, Clone)]
pub struct StagedRun<'r> {
    context: RunContext,
    refs: &'r ReferenceData,
    blocks: Vec<SampleBlock>,
    expected_samples: usize,
    resolution: Resolution,
    warnings: Vec<RunWarning>,
}

/// Parse the report, apply the set-count gate and auto-match identities.
///
/// # Errors
///
/// Returns [`Error::NoSampleBlocks`], [`Error::SetCountMismatch`] or
/// [`Error::MissingReference`] (no expected list for base/matrix).
pub fn stage<'r>(
    context: RunContext,
    grid: &ReportGrid,
    refs: &'r ReferenceData,
) -> Result<StagedRun<'r>> {
    let mode = context.mode;
    let blocks = BlockScanner::new()
        .with_matrix(mode.is_stability())
        .parse(grid)?;
    check_set_count(mode, blocks.len())?;

    let expected = refs.samples.expected(&context.base, &context.matrix)?;
    let mut warnings = Vec::new();
    if blocks.len() != expected.len() {
        tracing::warn!(
            expected = expected.len(),
            found = blocks.len(),
            "sample count mismatch"
        );
        warnings.push(RunWarning::SampleCountMismatch {
            expected: expected.len(),
            found: blocks.len(),
        });
    }
    if mode.is_stability() {
        let selected = normalize_sample_name(&context.matrix);
        for block in &blocks {
            if let Some(found) = &block.matrix {
                if normalize_sample_name(found) != selected {
                    warnings.push(RunWarning::MatrixMismatch {
                        set: block.ordinal,
                        found: found.clone(),
                    });
                }
            }
        }
    }

    let imported: Vec<String> = blocks.iter().map(|b| b.sample_name.clone()).collect();
    let resolution = resolve_identities(expected, &imported);
    tracing::info!(
        mode = %mode,
        blocks = blocks.len(),
        expected = expected.len(),
        pending = matches!(resolution, Resolution::Pending(_)),
        "staged report"
    );

    Ok(StagedRun {
        context,
        refs,
        expected_samples: expected.len(),
        blocks,
        resolution,
        warnings,
    })
}

impl StagedRun<'_> {
    /// Auto-matching outcome; inspect for pending decisions.
    #[must_use]
    pub const fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Detected blocks.
    #[must_use]
    pub fn blocks(&self) -> &[SampleBlock] {
        &self.blocks
    }

    /// Warnings raised while staging.
    #[must_use]
    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    /// Run context.
    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.context
    }

    /// Complete the sample mapping with caller decisions.
    ///
    /// # Errors
    ///
    /// See [`crate::qc::identity::PendingResolution::resolve`].
    pub fn mapping(&self, decisions: &BTreeMap<String, ManualChoice>) -> Result<SampleMapping> {
        self.resolution.clone().complete(decisions)
    }

    /// Resolve identities and evaluate in the staged mode.
    ///
    /// # Errors
    ///
    /// Identity errors from [`Self::mapping`] and report-shape errors from
    /// [`Self::evaluate`].
    pub fn finish(&self, decisions: &BTreeMap<String, ManualChoice>) -> Result<RunReport> {
        let mapping = self.mapping(decisions)?;
        self.evaluate(&mapping, self.context.mode)
    }

    /// Evaluate the staged blocks in `mode` with a completed mapping.
    ///
    /// Accuracy and Precision can both be evaluated from one staging.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SetCountMismatch`] if `mode` is a stability mode
    /// the block count does not satisfy, and [`Error::MissingColumn`] for a
    /// block lacking `Elements` / `Mean`.
    pub fn evaluate(&self, mapping: &SampleMapping, mode: TestMode) -> Result<RunReport> {
        check_set_count(mode, self.blocks.len())?;
        let mut warnings = self.warnings.clone();
        for expected in mapping.expected() {
            if mapping.imported_for(expected).is_none() {
                warnings.push(RunWarning::ExpectedSampleMissing {
                    sample: expected.clone(),
                });
            }
        }

        let mut rows = Vec::new();
        for block in &self.blocks {
            let sample = mapping.canonical(&block.sample_name);
            if !mapping.is_mapped(&block.sample_name) {
                let warning = RunWarning::UnmappedImportedSample {
                    sample: sample.clone(),
                };
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }
            rows.extend(extract_rows(block, &sample, &self.context.base)?);
        }

        let metric_ctx = MetricContext {
            mode,
            thresholds: self.refs.thresholds.as_ref(),
            exclusions: &self.refs.exclusions,
        };
        let rows = evaluate_rows(rows, &metric_ctx);
        let summary = summarize(&rows);
        let element_totals = element_totals(&summary);
        let row_totals = row_totals(&rows);
        for warning in &warnings {
            tracing::warn!(%warning, "run warning");
        }
        tracing::info!(
            mode = %mode,
            rows = rows.len(),
            elements = summary.len(),
            passed = element_totals.passed,
            failed = element_totals.failed,
            "evaluated run"
        );

        Ok(RunReport {
            context: RunContext {
                mode,
                ..self.context.clone()
            },
            blocks_found: self.blocks.len(),
            expected_samples: self.expected_samples,
            rows,
            summary,
            element_totals,
            row_totals,
            mapping: mapping.table(),
            warnings,
        })
    }
}

/// One-shot run: stage, resolve with `decisions`, evaluate.
///
/// # Errors
///
/// Any error from [`stage`] or [`StagedRun::finish`].
pub fn run(
    context: RunContext,
    grid: &ReportGrid,
    refs: &ReferenceData,
    decisions: &BTreeMap<String, ManualChoice>,
) -> Result<RunReport> {
    stage(context, grid, refs)?.finish(decisions)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::io::reference::SampleDatabase;
    use crate::qc::metrics::Verdict;

    fn refs(samples: &str) -> ReferenceData {
        let mut db = SampleDatabase::new();
        db.insert_sheet("Water", &ReportGrid::from_delimited(samples, ','));
        ReferenceData {
            samples: db,
            ..ReferenceData::default()
        }
    }

    fn report(names: &[&str]) -> ReportGrid {
        let mut text = String::new();
        for name in names {
            text.push_str(&format!(
                "Sample Name: {name} | Matrix: M1\nElements\tMean\tCert. Val.\tAcceptance-2s\nPb (%)\t10.0\t10.2\t0.8\n\n"
            ));
        }
        ReportGrid::from_delimited(&text, '\t')
    }

    #[test]
    fn set_count_gate() {
        assert!(check_set_count(TestMode::ShortTermStability, 8).is_ok());
        assert!(check_set_count(TestMode::LongTermStability, 16).is_ok());
        assert!(check_set_count(TestMode::Accuracy, 3).is_ok());
        let err = check_set_count(TestMode::ShortTermStability, 9).unwrap_err();
        assert!(matches!(
            err,
            Error::SetCountMismatch {
                expected: 8,
                found: 9,
                ..
            }
        ));
    }

    #[test]
    fn accuracy_run_resolves_and_evaluates() {
        let refs = refs("M1\nCRM-1\nNIST-1643F");
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::Accuracy);
        let grid = report(&["crm-1", "NIST 1643F"]);
        let report = run(ctx, &grid, &refs, &BTreeMap::new()).unwrap();
        assert_eq!(report.blocks_found, 2);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].row.sample, "NIST-1643F");
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.summary[0].verdict, Verdict::Pass);
        assert_eq!(report.summary[0].sample_count, 2);
    }

    #[test]
    fn count_mismatch_is_warning_only() {
        let refs = refs("M1\nCRM-1\nCRM-2");
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::Accuracy);
        let staged = stage(ctx, &report(&["CRM-1"]), &refs).unwrap();
        assert_eq!(
            staged.warnings(),
            &[RunWarning::SampleCountMismatch {
                expected: 2,
                found: 1
            }]
        );
        let Resolution::Pending(pending) = staged.resolution() else {
            panic!("CRM-2 is missing");
        };
        assert_eq!(pending.unresolved(), &["CRM-2".to_string()]);

        let mut decisions = BTreeMap::new();
        decisions.insert("CRM-2".to_string(), ManualChoice::NotFound);
        let report = staged.finish(&decisions).unwrap();
        assert!(report.warnings.contains(&RunWarning::ExpectedSampleMissing {
            sample: "CRM-2".into()
        }));
        assert_eq!(report.mapping[1].imported, None);
    }

    #[test]
    fn unmapped_imported_samples_still_evaluated() {
        let refs = refs("M1\nCRM-1\nBLANK");
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::Accuracy);
        let staged = stage(ctx, &report(&["CRM-1", "MYSTERY"]), &refs).unwrap();
        let mut decisions = BTreeMap::new();
        decisions.insert("BLANK".to_string(), ManualChoice::NotFound);
        let report = staged.finish(&decisions).unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].row.sample, "MYSTERY");
        assert!(report.warnings.contains(&RunWarning::UnmappedImportedSample {
            sample: "MYSTERY".into()
        }));
    }

    #[test]
    fn stability_gate_runs_before_reference_lookup() {
        let refs = ReferenceData::default();
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::ShortTermStability);
        let err = stage(ctx, &report(&["S"; 7]), &refs).unwrap_err();
        assert!(matches!(err, Error::SetCountMismatch { found: 7, .. }));
    }

    #[test]
    fn missing_expected_list_is_fatal() {
        let refs = refs("M1\nCRM-1");
        let ctx = RunContext::new("Water", "M9", "X1", TestMode::Accuracy);
        assert!(matches!(
            stage(ctx, &report(&["CRM-1"]), &refs),
            Err(Error::MissingReference(_))
        ));
    }

    #[test]
    fn stability_matrix_mismatch_warns() {
        let refs = refs("M2\nS");
        let ctx = RunContext::new("Water", "M2", "X1", TestMode::ShortTermStability);
        let staged = stage(ctx, &report(&["S"; 8]), &refs).unwrap();
        let mismatches = staged
            .warnings()
            .iter()
            .filter(|w| matches!(w, RunWarning::MatrixMismatch { .. }))
            .count();
        assert_eq!(mismatches, 8);
        assert!(staged
            .warnings()
            .contains(&RunWarning::MatrixMismatch {
                set: 1,
                found: "M1".into()
            }));
    }

    #[test]
    fn stability_sets_still_checked_against_expected_list() {
        let refs = refs("M1\nCRM-1\nCRM-2");
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::ShortTermStability);
        let staged = stage(ctx, &report(&["CRM-1"; 8]), &refs).unwrap();
        assert_eq!(
            staged.warnings(),
            &[RunWarning::SampleCountMismatch {
                expected: 2,
                found: 8
            }]
        );
    }

    #[test]
    fn staged_accuracy_can_evaluate_precision() {
        let refs = refs("M1\nCRM-1");
        let ctx = RunContext::new("Water", "M1", "X1", TestMode::Accuracy);
        let staged = stage(ctx, &report(&["CRM-1"]), &refs).unwrap();
        let mapping = staged.mapping(&BTreeMap::new()).unwrap();
        let precision = staged.evaluate(&mapping, TestMode::Precision).unwrap();
        assert_eq!(precision.context.mode, TestMode::Precision);
        assert_eq!(precision.rows[0].eval.verdict, Verdict::Na, "no SD column");
        assert!(staged
            .evaluate(&mapping, TestMode::LongTermStability)
            .is_err());
    }
}
