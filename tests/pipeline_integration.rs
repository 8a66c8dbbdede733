// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end verification runs over on-disk delimited reports.
//!
//! Reports are written to a temp dir, read back through `io::read_report`
//! and pushed through staging, identity resolution and evaluation.

use aps_verify::error::Error;
use aps_verify::io::grid::ReportGrid;
use aps_verify::io::read_report;
use aps_verify::io::reference::{ExclusionList, ReferenceData, SampleDatabase, ThresholdTable};
use aps_verify::limits;
use aps_verify::qc::identity::{ManualChoice, Resolution};
use aps_verify::qc::metrics::{TestMode, Verdict};
use aps_verify::qc::run::{self, RunContext, RunReport, RunWarning};
use aps_verify::report;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════

struct Block<'a> {
    sample: &'a str,
    header: &'a str,
    rows: &'a [&'a str],
}

fn write_report(dir: &TempDir, name: &str, blocks: &[Block<'_>]) -> PathBuf {
    let path = dir.path().join(name);
    let mut f = File::create(&path).unwrap();
    writeln!(f, "Instrument export\tARL-4460").unwrap();
    writeln!(f).unwrap();
    for b in blocks {
        writeln!(f, "Sample Name: {} | Matrix: M1 | Date: 2026-03-02", b.sample).unwrap();
        writeln!(f, "{}", b.header).unwrap();
        for row in b.rows {
            writeln!(f, "{row}").unwrap();
        }
        writeln!(f).unwrap();
    }
    path
}

const HEADER: &str = "Elements\tMean\tSD\tCert. Val.\tAcceptance-2s";

fn stability_blocks(sets: usize) -> Vec<Block<'static>> {
    (0..sets)
        .map(|_| Block {
            sample: "CRM-1",
            header: HEADER,
            rows: &["Pb (%)\t10.0\t0.1\t10.2\t0.8"],
        })
        .collect()
}

fn references(samples: &str) -> ReferenceData {
    let mut db = SampleDatabase::new();
    db.insert_sheet("Cu", &ReportGrid::from_delimited(samples, ','));
    ReferenceData {
        samples: db,
        thresholds: None,
        exclusions: ExclusionList::default(),
    }
}

fn run_file(
    path: &std::path::Path,
    mode: TestMode,
    refs: &ReferenceData,
) -> Result<RunReport, Error> {
    let grid = read_report(path).unwrap();
    run::run(
        RunContext::new("Cu", "M1", "ARL-4460", mode),
        &grid,
        refs,
        &BTreeMap::new(),
    )
}

// ═══════════════════════════════════════════════════════════════════
// End-to-end
// ═══════════════════════════════════════════════════════════════════

#[test]
fn short_term_stability_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_report(&dir, "short.tsv", &stability_blocks(8));
    let report = run_file(&path, TestMode::ShortTermStability, &references("M1\nCRM-1")).unwrap();

    assert_eq!(report.blocks_found, 8);
    assert_eq!(report.rows.len(), 8);
    for (i, r) in report.rows.iter().enumerate() {
        assert_eq!(r.row.set, i + 1);
        assert_eq!(r.row.matrix.as_deref(), Some("M1"));
        assert!((r.eval.limit.unwrap() - 0.6).abs() < limits::ANALYTICAL_F64);
        assert_eq!(r.eval.percent, Some(33.33));
        assert_eq!(r.eval.verdict, Verdict::Pass);
    }
    assert_eq!(report.summary.len(), 1);
    assert_eq!(report.summary[0].element, "Pb");
    assert_eq!(report.summary[0].verdict, Verdict::Pass);
    assert_eq!(report.summary[0].sample_count, 8);
    assert_eq!(report.element_totals.passed, 1);
    assert_eq!(
        report.warnings,
        vec![RunWarning::SampleCountMismatch {
            expected: 1,
            found: 8
        }]
    );

    let mut buf = Vec::new();
    report::write_rows_tsv(&mut buf, &report).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.lines().nth(1).unwrap().ends_with("0.6\t33.33\tPass"));
}

#[test]
fn csv_report_reads_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acc.csv");
    std::fs::write(
        &path,
        "Sample Name: CRM-1\nElements,Mean,Cert. Val.,Acceptance-3s\nPb,10.0,10.9,0.9\n",
    )
    .unwrap();
    let report = run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1")).unwrap();
    // DEV 0.9 against 0.9 / 3 = 0.3
    assert_eq!(report.rows[0].eval.percent, Some(300.0));
    assert_eq!(report.summary[0].verdict, Verdict::Fail);
}

// ═══════════════════════════════════════════════════════════════════
// Block parsing and cardinality
// ═══════════════════════════════════════════════════════════════════

#[test]
fn block_count_and_names() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [
        Block {
            sample: "CRM-1",
            header: HEADER,
            rows: &["Pb\t1\t0.01\t1\t0.2"],
        },
        Block {
            sample: "CRM-2",
            header: HEADER,
            rows: &["Pb\t2\t0.02\t2\t0.2", "Zn\t3\t0.03\t3\t0.2"],
        },
        Block {
            sample: "CRM-3",
            header: HEADER,
            rows: &[],
        },
    ];
    let path = write_report(&dir, "three.tsv", &blocks);
    let grid = read_report(&path).unwrap();
    let refs = references("M1\nCRM-1\nCRM-2\nCRM-3");
    let staged = run::stage(
        RunContext::new("Cu", "M1", "X", TestMode::Accuracy),
        &grid,
        &refs,
    )
    .unwrap();
    let names: Vec<&str> = staged
        .blocks()
        .iter()
        .map(|b| b.sample_name.as_str())
        .collect();
    assert_eq!(names, vec!["CRM-1", "CRM-2", "CRM-3"]);
    assert_eq!(staged.blocks()[1].rows.len(), 2);
    assert!(matches!(staged.resolution(), Resolution::Resolved(_)));
}

#[test]
fn stability_set_count_gate() {
    let dir = tempfile::tempdir().unwrap();
    let refs = references("M1\nCRM-1");
    for (sets, ok) in [(7, false), (8, true), (9, false)] {
        let path = write_report(&dir, &format!("s{sets}.tsv"), &stability_blocks(sets));
        let outcome = run_file(&path, TestMode::ShortTermStability, &refs);
        assert_eq!(outcome.is_ok(), ok, "{sets} sets");
        if !ok {
            let err = outcome.unwrap_err();
            assert!(err.to_string().contains("requires 8 sets"), "{err}");
        }
    }
    let path = write_report(&dir, "l16.tsv", &stability_blocks(16));
    assert!(run_file(&path, TestMode::LongTermStability, &refs).is_ok());
}

#[test]
fn report_without_markers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.tsv");
    std::fs::write(&path, "Elements\tMean\nPb\t1.0\n").unwrap();
    assert!(matches!(
        run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1")),
        Err(Error::NoSampleBlocks)
    ));
}

// ═══════════════════════════════════════════════════════════════════
// Limits
// ═══════════════════════════════════════════════════════════════════

#[test]
fn stability_multipliers_and_exclusion() {
    let dir = tempfile::tempdir().unwrap();
    let mut refs = references("M1\nCRM-1");
    let short = write_report(&dir, "short.tsv", &stability_blocks(8));
    let long = write_report(&dir, "long.tsv", &stability_blocks(16));

    let limit = |path: &PathBuf, mode, refs: &ReferenceData| {
        run_file(path, mode, refs).unwrap().rows[0].eval.limit.unwrap()
    };
    assert!((limit(&short, TestMode::ShortTermStability, &refs) - 0.6).abs() < 1e-12);
    assert!((limit(&long, TestMode::LongTermStability, &refs) - 1.2).abs() < 1e-12);

    refs.exclusions = ExclusionList::parse("Pb");
    assert!((limit(&short, TestMode::ShortTermStability, &refs) - 1.2).abs() < 1e-12);
    assert!((limit(&long, TestMode::LongTermStability, &refs) - 1.2).abs() < 1e-12);
}

#[test]
fn sigma_normalization() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [Block {
        sample: "CRM-1",
        header: "Elements\tMean\tCert. Val.\tAcceptance-2s\tAcceptance-3s",
        rows: &["Pb\t10\t11\t4\t", "Zn\t10\t11\t\t9"],
    }];
    let path = write_report(&dir, "sigma.tsv", &blocks);
    let report = run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1")).unwrap();
    let by_element = |e: &str| {
        report
            .rows
            .iter()
            .find(|r| r.row.element == e)
            .unwrap()
            .eval
            .limit
    };
    assert_eq!(by_element("Pb"), Some(2.0));
    assert_eq!(by_element("Zn"), Some(3.0));
}

#[test]
fn threshold_table_fallback_when_acceptance_blank() {
    let dir = tempfile::tempdir().unwrap();
    let blocks: Vec<Block<'_>> = (0..8)
        .map(|_| Block {
            sample: "CRM-1",
            header: HEADER,
            rows: &["Pb\t10.0\t0.1\t10.2\t-"],
        })
        .collect();
    let path = write_report(&dir, "fallback.tsv", &blocks);
    let mut refs = references("M1\nCRM-1");
    refs.thresholds = Some(
        ThresholdTable::from_grid(&ReportGrid::from_delimited("band,Pb\n10,0.1\n20,0.4", ','))
            .unwrap(),
    );
    let report = run_file(&path, TestMode::ShortTermStability, &refs).unwrap();
    assert!((report.rows[0].eval.limit.unwrap() - 0.6).abs() < 1e-12);

    refs.thresholds = None;
    let report = run_file(&path, TestMode::ShortTermStability, &refs).unwrap();
    assert_eq!(report.rows[0].eval.verdict, Verdict::Na);
    assert_eq!(report.summary[0].verdict, Verdict::Na);
}

#[test]
fn precision_uses_five_percent_of_cv() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [Block {
        sample: "CRM-1",
        header: HEADER,
        rows: &["Pb\t10.0\t0.4\t10.0\t0.8", "Zn\t20.0\t0.5\t-\t0.8"],
    }];
    let path = write_report(&dir, "prec.tsv", &blocks);
    let report = run_file(&path, TestMode::Precision, &references("M1\nCRM-1")).unwrap();
    // Pb: 0.4 / 0.5 = 80%; Zn has no certified value, CV falls back to the mean: 0.5 / 1.0
    assert_eq!(report.rows[0].eval.percent, Some(80.0));
    assert_eq!(report.rows[1].eval.percent, Some(50.0));
    assert_eq!(report.rows[1].eval.verdict, Verdict::Pass);
    let zn = report.summary.iter().find(|s| s.element == "Zn").unwrap();
    assert_eq!(zn.verdict, Verdict::Na, "only uncertified rows");
}

// ═══════════════════════════════════════════════════════════════════
// NA propagation, censoring and aggregation
// ═══════════════════════════════════════════════════════════════════

#[test]
fn invalid_certified_value_is_na_and_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [Block {
        sample: "CRM-1",
        header: HEADER,
        rows: &["Pb\t10\t0.1\tn/a\t0.8", "Zn\t10\t0.1\t10.1\t0.8"],
    }];
    let path = write_report(&dir, "na.tsv", &blocks);
    let report = run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1")).unwrap();
    let pb = &report.rows[0];
    assert_eq!(pb.eval.dev, None);
    assert_eq!(pb.eval.percent, None);
    assert_eq!(pb.eval.verdict, Verdict::Na);
    assert_eq!(report.row_totals.valid, 1);
    assert_eq!(report.element_totals.not_assessed, 1);
    assert_eq!(report.element_totals.assessed(), 1);
}

#[test]
fn censored_mean_and_base_rows_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [Block {
        sample: "CRM-1",
        header: HEADER,
        rows: &[
            "Pb\t<0.001\t0.1\t0.002\t0.8",
            "Cu (%)\t99.0\t0.1\t99.0\t0.8",
            "Zn\t10\t0.1\t10.1\t0.8",
        ],
    }];
    let path = write_report(&dir, "censored.tsv", &blocks);
    let report = run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1")).unwrap();
    let elements: Vec<&str> = report.rows.iter().map(|r| r.row.element.as_str()).collect();
    assert_eq!(elements, vec!["Zn"]);
}

#[test]
fn element_unanimity() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [
        Block {
            sample: "CRM-1",
            header: HEADER,
            rows: &["Pb\t10\t0.1\t10.1\t0.8", "Zn\t10\t0.1\t10.1\t0.8"],
        },
        Block {
            sample: "CRM-2",
            header: HEADER,
            rows: &["Pb\t10\t0.1\t10.1\t0.8", "Zn\t10\t0.1\t10.1\t0.8"],
        },
        Block {
            sample: "CRM-3",
            header: HEADER,
            rows: &["Pb\t10\t0.1\t12.0\t0.8", "Zn\t10\t0.1\t\t0.8"],
        },
    ];
    let path = write_report(&dir, "unanimity.tsv", &blocks);
    let report =
        run_file(&path, TestMode::Accuracy, &references("M1\nCRM-1\nCRM-2\nCRM-3")).unwrap();
    let verdict = |e: &str| {
        report
            .summary
            .iter()
            .find(|s| s.element == e)
            .unwrap()
            .verdict
    };
    assert_eq!(verdict("Pb"), Verdict::Fail);
    assert_eq!(verdict("Zn"), Verdict::Pass);
    assert_eq!(report.element_totals.passed, 1);
    assert_eq!(report.element_totals.failed, 1);
}

// ═══════════════════════════════════════════════════════════════════
// Identity resolution
// ═══════════════════════════════════════════════════════════════════

#[test]
fn manual_mapping_relabels_rows() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [
        Block {
            sample: "NIST 1643F",
            header: HEADER,
            rows: &["Pb\t10\t0.1\t10.1\t0.8"],
        },
        Block {
            sample: "blank run",
            header: HEADER,
            rows: &["Zn\t0\t0\t-\t0.8"],
        },
    ];
    let path = write_report(&dir, "ident.tsv", &blocks);
    let grid = read_report(&path).unwrap();
    let refs = references("M1\nNIST-1643F\nBLANK\nCRM-9");
    let staged = run::stage(
        RunContext::new("Cu", "M1", "X", TestMode::Accuracy),
        &grid,
        &refs,
    )
    .unwrap();
    assert!(staged
        .warnings()
        .contains(&RunWarning::SampleCountMismatch {
            expected: 3,
            found: 2
        }));

    let Resolution::Pending(pending) = staged.resolution() else {
        panic!("BLANK and CRM-9 need decisions");
    };
    assert_eq!(pending.unresolved(), &["BLANK".to_string(), "CRM-9".into()]);
    assert!(matches!(
        staged.finish(&BTreeMap::new()),
        Err(Error::UnresolvedSamples(_))
    ));

    let mut decisions = BTreeMap::new();
    decisions.insert(
        "BLANK".to_string(),
        ManualChoice::Imported("blank run".into()),
    );
    decisions.insert("CRM-9".to_string(), ManualChoice::NotFound);
    let report = staged.finish(&decisions).unwrap();
    let samples: Vec<&str> = report.rows.iter().map(|r| r.row.sample.as_str()).collect();
    assert_eq!(samples, vec!["NIST-1643F", "BLANK"]);
    assert_eq!(report.mapping[2].imported, None);
    assert!(report.warnings.contains(&RunWarning::ExpectedSampleMissing {
        sample: "CRM-9".into()
    }));
}

#[test]
fn accuracy_and_precision_from_one_staging() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = [Block {
        sample: "CRM-1",
        header: HEADER,
        rows: &["Pb\t10.0\t0.4\t10.2\t0.8"],
    }];
    let path = write_report(&dir, "ap.tsv", &blocks);
    let grid = read_report(&path).unwrap();
    let refs = references("M1\nCRM-1");
    let staged = run::stage(
        RunContext::new("Cu", "M1", "X", TestMode::Accuracy),
        &grid,
        &refs,
    )
    .unwrap();
    let mapping = staged.mapping(&BTreeMap::new()).unwrap();
    let accuracy = staged.evaluate(&mapping, TestMode::Accuracy).unwrap();
    let precision = staged.evaluate(&mapping, TestMode::Precision).unwrap();
    assert_eq!(accuracy.rows[0].eval.percent, Some(50.0));
    // SD 0.4 against 10.2 × 0.05 = 0.51
    assert_eq!(precision.rows[0].eval.percent, Some(78.43));

    let json = report::to_json(&[accuracy, precision]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["runs"][1]["context"]["mode"], "Precision");
}
