// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-element rollup of row verdicts across samples and sets.
//!
//! An element passes only if every row with a defined verdict passes.
//! Rows whose verdict is NA are left out of the vote; an element whose
//! rows all carry the `-` certificate sentinel, or whose rows are all NA,
//! is NA itself and is left out of the pass/fail totals.

use crate::qc::metrics::{CertifiedValue, EvaluatedRow, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate verdict for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSummary {
    /// Element symbol.
    pub element: String,
    /// Unanimity verdict.
    pub verdict: Verdict,
    /// Rows with a defined percentage-of-limit.
    pub sample_count: usize,
}

/// Pass/fail counts over element summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ElementTotals {
    /// Elements that passed.
    pub passed: usize,
    /// Elements that failed.
    pub failed: usize,
    /// Elements without a verdict (excluded from the denominator).
    pub not_assessed: usize,
}

impl ElementTotals {
    /// Elements with a Pass or Fail verdict.
    #[must_use]
    pub const fn assessed(&self) -> usize {
        self.passed + self.failed
    }
}

/// Row-level counts, as shown next to the row table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowTotals {
    /// Rows with a defined percentage-of-limit that passed.
    pub passed: usize,
    /// Rows with a defined percentage-of-limit.
    pub valid: usize,
}

/// Reduce evaluated rows to one summary per element, sorted by symbol.
#[must_use]
pub fn summarize(rows: &[EvaluatedRow]) -> Vec<ElementSummary> {
    let mut groups: BTreeMap<&str, Vec<&EvaluatedRow>> = BTreeMap::new();
    for r in rows {
        groups.entry(r.row.element.as_str()).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(element, group)| ElementSummary {
            element: element.to_string(),
            verdict: element_verdict(&group),
            sample_count: group.iter().filter(|r| r.eval.percent.is_some()).count(),
        })
        .collect()
}

fn element_verdict(group: &[&EvaluatedRow]) -> Verdict {
    if group
        .iter()
        .all(|r| r.row.certified == CertifiedValue::Uncertified)
    {
        return Verdict::Na;
    }
    let mut decided = group
        .iter()
        .map(|r| r.eval.verdict)
        .filter(|v| *v != Verdict::Na)
        .peekable();
    if decided.peek().is_none() {
        return Verdict::Na;
    }
    if decided.all(|v| v == Verdict::Pass) {
        Verdict::Pass
    } else {
        Verdict::Fail
    }
}

/// Count element verdicts.
#[must_use]
pub fn element_totals(summaries: &[ElementSummary]) -> ElementTotals {
    summaries
        .iter()
        .fold(ElementTotals::default(), |mut acc, s| {
            match s.verdict {
                Verdict::Pass => acc.passed += 1,
                Verdict::Fail => acc.failed += 1,
                Verdict::Na => acc.not_assessed += 1,
            }
            acc
        })
}

/// Count rows with a defined percentage and how many of them passed.
#[must_use]
pub fn row_totals(rows: &[EvaluatedRow]) -> RowTotals {
    let valid: Vec<&EvaluatedRow> = rows.iter().filter(|r| r.eval.percent.is_some()).collect();
    RowTotals {
        passed: valid
            .iter()
            .filter(|r| r.eval.verdict == Verdict::Pass)
            .count(),
        valid: valid.len(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::qc::metrics::{Evaluation, MeasurementRow};

    fn evaluated(element: &str, certified: CertifiedValue, verdict: Verdict) -> EvaluatedRow {
        let percent = (verdict != Verdict::Na).then_some(50.0);
        EvaluatedRow {
            row: MeasurementRow {
                set: 1,
                sample: "S".into(),
                matrix: None,
                element: element.into(),
                mean: Some(1.0),
                mean_text: "1".into(),
                certified,
                certified_text: String::new(),
                sd: None,
                acceptance: Vec::new(),
            },
            eval: Evaluation {
                cv: Some(1.0),
                dev: Some(0.1),
                limit: Some(0.2),
                percent,
                verdict,
            },
        }
    }

    const CERT: CertifiedValue = CertifiedValue::Certified(1.0);

    #[test]
    fn one_fail_fails_the_element() {
        let rows = vec![
            evaluated("Pb", CERT, Verdict::Pass),
            evaluated("Pb", CERT, Verdict::Pass),
            evaluated("Pb", CERT, Verdict::Fail),
        ];
        let summary = summarize(&rows);
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].verdict, Verdict::Fail);
        assert_eq!(summary[0].sample_count, 3);
    }

    #[test]
    fn na_rows_do_not_vote() {
        let rows = vec![
            evaluated("Pb", CERT, Verdict::Pass),
            evaluated("Pb", CERT, Verdict::Pass),
            evaluated("Pb", CertifiedValue::Invalid, Verdict::Na),
        ];
        let summary = summarize(&rows);
        assert_eq!(summary[0].verdict, Verdict::Pass);
        assert_eq!(summary[0].sample_count, 2);
    }

    #[test]
    fn all_uncertified_element_is_na() {
        let rows = vec![
            evaluated("Cu", CertifiedValue::Uncertified, Verdict::Pass),
            evaluated("Cu", CertifiedValue::Uncertified, Verdict::Pass),
        ];
        assert_eq!(summarize(&rows)[0].verdict, Verdict::Na);
    }

    #[test]
    fn partly_uncertified_element_still_votes() {
        let rows = vec![
            evaluated("Cu", CertifiedValue::Uncertified, Verdict::Pass),
            evaluated("Cu", CERT, Verdict::Fail),
        ];
        assert_eq!(summarize(&rows)[0].verdict, Verdict::Fail);
    }

    #[test]
    fn all_na_element_is_na() {
        let rows = vec![evaluated("Zn", CertifiedValue::Invalid, Verdict::Na)];
        let summary = summarize(&rows);
        assert_eq!(summary[0].verdict, Verdict::Na);
        assert_eq!(summary[0].sample_count, 0);
    }

    #[test]
    fn summaries_sorted_and_totals_exclude_na() {
        let rows = vec![
            evaluated("Zn", CERT, Verdict::Pass),
            evaluated("Cd", CERT, Verdict::Fail),
            evaluated("Pb", CERT, Verdict::Pass),
            evaluated("Hg", CertifiedValue::Invalid, Verdict::Na),
        ];
        let summary = summarize(&rows);
        let order: Vec<&str> = summary.iter().map(|s| s.element.as_str()).collect();
        assert_eq!(order, vec!["Cd", "Hg", "Pb", "Zn"]);

        let totals = element_totals(&summary);
        assert_eq!(totals.passed, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.not_assessed, 1);
        assert_eq!(totals.assessed(), 3);

        let rt = row_totals(&rows);
        assert_eq!(rt, RowTotals { passed: 2, valid: 3 });
    }

    #[test]
    fn empty_input() {
        assert!(summarize(&[]).is_empty());
        assert_eq!(element_totals(&[]), ElementTotals::default());
    }
}
