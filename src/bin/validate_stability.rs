// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validate stability limits and verdicts against hand-computed values.
//!
//! # Scenario
//!
//! | Field | Value |
//! |-------|-------|
//! | Element | Pb |
//! | Mean / Cert. Val. | 10.0 / 10.2 (DEV 0.2) |
//! | Acceptance-2s | 0.8 (one sigma 0.4) |
//! | ShortTerm | 8 sets, limit 0.4 × 1.5 = 0.6, %DEV 33.33 |
//! | LongTerm | 16 sets, limit 0.4 × 3 = 1.2, %DEV 16.67 |
//!
//! Also covers the exclusion-list override, the threshold-table fallback
//! and the set-count gate. Everything is built in memory; no data
//! directory is needed.

use aps_verify::error::Error;
use aps_verify::io::grid::ReportGrid;
use aps_verify::io::reference::{ExclusionList, ReferenceData, SampleDatabase, ThresholdTable};
use aps_verify::limits;
use aps_verify::qc::metrics::TestMode;
use aps_verify::qc::run::{self, RunContext, RunReport};
use aps_verify::validation::Validator;
use std::collections::BTreeMap;

fn report_grid(sets: usize, with_acceptance: bool) -> ReportGrid {
    let mut text = String::new();
    for _ in 0..sets {
        text.push_str("Sample Name: CRM-1 | Matrix: M1\n");
        if with_acceptance {
            text.push_str("Elements\tMean\tCert. Val.\tAcceptance-2s\nPb (%)\t10.0\t10.2\t0.8\n\n");
        } else {
            text.push_str("Elements\tMean\tCert. Val.\nPb (%)\t10.0\t10.2\n\n");
        }
    }
    ReportGrid::from_delimited(&text, '\t')
}

fn references(exclusions: &str) -> ReferenceData {
    let mut samples = SampleDatabase::new();
    samples.insert_sheet("Cu", &ReportGrid::from_delimited("M1\nCRM-1", ','));
    let thresholds = ThresholdTable::from_grid(&ReportGrid::from_delimited(
        "Cert. Val.,Pb\n5,0.1\n100,0.4",
        ',',
    ))
    .ok();
    ReferenceData {
        samples,
        thresholds,
        exclusions: ExclusionList::parse(exclusions),
    }
}

fn execute(
    mode: TestMode,
    grid: &ReportGrid,
    refs: &ReferenceData,
) -> Result<RunReport, Error> {
    run::run(
        RunContext::new("Cu", "M1", "ARL-4460", mode),
        grid,
        refs,
        &BTreeMap::new(),
    )
}

fn check_scenario(
    v: &mut Validator,
    label: &str,
    outcome: Result<RunReport, Error>,
    limit: f64,
    percent: f64,
    sets: usize,
) {
    match outcome {
        Ok(report) => {
            v.check_count(&format!("{label}: rows"), report.rows.len(), sets);
            let first = &report.rows[0];
            v.check_some(
                &format!("{label}: DEV"),
                first.eval.dev,
                0.2,
                1e-9,
            );
            v.check_some(
                &format!("{label}: limit"),
                first.eval.limit,
                limit,
                limits::ANALYTICAL_F64,
            );
            v.check_some(
                &format!("{label}: %DEV"),
                first.eval.percent,
                percent,
                limits::ANALYTICAL_F64,
            );
            v.check_text(
                &format!("{label}: row verdict"),
                &first.eval.verdict.to_string(),
                "Pass",
            );
            v.check_text(
                &format!("{label}: element verdict"),
                &report.summary[0].verdict.to_string(),
                "Pass",
            );
            v.check_count(
                &format!("{label}: Sample_Count"),
                report.summary[0].sample_count,
                sets,
            );
        }
        Err(e) => {
            println!("  [FAIL]  {label}: {e}");
            v.check_count(&format!("{label}: completed"), 0, 1);
        }
    }
}

fn main() {
    let mut v = Validator::new("APS Stability Verification Validation");
    let refs = references("");

    v.section("── ShortTerm (8 sets, ×1.5) ──");
    let outcome = execute(TestMode::ShortTermStability, &report_grid(8, true), &refs);
    check_scenario(&mut v, "ShortTerm", outcome, 0.6, 33.33, 8);

    v.section("── LongTerm (16 sets, ×3) ──");
    let outcome = execute(TestMode::LongTermStability, &report_grid(16, true), &refs);
    check_scenario(&mut v, "LongTerm", outcome, 1.2, 16.67, 16);

    v.section("── Exclusion list overrides ShortTerm multiplier ──");
    let excluded = references("Pb");
    let outcome = execute(TestMode::ShortTermStability, &report_grid(8, true), &excluded);
    check_scenario(&mut v, "ShortTerm excluded", outcome, 1.2, 16.67, 8);

    v.section("── Threshold table fallback (band 100 → 0.4) ──");
    let outcome = execute(TestMode::ShortTermStability, &report_grid(8, false), &refs);
    check_scenario(&mut v, "ShortTerm threshold", outcome, 0.6, 33.33, 8);

    v.section("── Set-count gate ──");
    for (mode, sets) in [
        (TestMode::ShortTermStability, 7),
        (TestMode::ShortTermStability, 9),
        (TestMode::LongTermStability, 15),
    ] {
        let rejected = matches!(
            execute(mode, &report_grid(sets, true), &refs),
            Err(Error::SetCountMismatch { found, .. }) if found == sets
        );
        v.check_count(
            &format!("{mode} with {sets} sets rejected"),
            usize::from(rejected),
            1,
        );
    }

    v.finish();
}
