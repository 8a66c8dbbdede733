// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample identity resolution: noisy report names → expected reference
//! samples.
//!
//! Operators type sample names by hand, so the names in marker rows drift
//! from the reference list ("CRM 12" vs "CRM-12"). Resolution is two-phase:
//!
//! 1. [`resolve_identities`] normalizes both sides (trim, uppercase) and
//!    auto-matches each expected name to at most one imported name whose
//!    gestalt similarity is ≥ [`limits::NAME_MATCH_CUTOFF`].
//! 2. If any expected name has no match, the result is
//!    [`Resolution::Pending`]; the caller supplies a [`ManualChoice`] per
//!    unresolved name and calls [`PendingResolution::resolve`].
//!
//! The similarity is the Ratcliff/Obershelp ratio `2·M / T`, where `M` is
//! the number of characters in recursively found longest common blocks and
//! `T` the combined length.

use crate::error::{Error, Result};
use crate::limits;
use std::collections::BTreeMap;

/// Trim and uppercase a sample name.
#[must_use]
pub fn normalize_sample_name(name: &str) -> String {
    name.trim().to_uppercase()
}

// ── Gestalt similarity ───────────────────────────────────────────

/// Longest common block in `a[alo..ahi]` × `b[blo..bhi]`.
///
/// Ties resolve to the earliest start in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0);
    let mut prev = vec![0_usize; b.len() + 1];
    let mut cur = vec![0_usize; b.len() + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            cur[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best_len {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_len = k;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
        cur[blo..=bhi].fill(0);
    }
    (best_i, best_j, best_len)
}

/// Total characters covered by the recursive matching blocks.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut queue = vec![((0, a.len()), (0, b.len()))];
    while let Some(((alo, ahi), (blo, bhi))) = queue.pop() {
        let (i, j, k) = longest_match(a, b, (alo, ahi), (blo, bhi));
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            queue.push(((alo, i), (blo, j)));
        }
        if i + k < ahi && j + k < bhi {
            queue.push(((i + k, ahi), (j + k, bhi)));
        }
    }
    total
}

/// Gestalt similarity of `a` and `b` in \[0, 1\]. Two empty strings score 1.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

/// Best candidate scoring ≥ `cutoff` against `word`, if any.
///
/// Equal scores resolve to the lexicographically greatest candidate.
#[must_use]
pub fn closest_match<'a>(word: &str, candidates: &'a [String], cutoff: f64) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (similarity(c, word), c))
        .filter(|(score, _)| *score >= cutoff)
        .max_by(|(sa, ca), (sb, cb)| sa.total_cmp(sb).then_with(|| ca.cmp(cb)))
        .map(|(_, c)| c.as_str())
}

// ── Mapping ──────────────────────────────────────────────────────

/// Imported → expected name mapping, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleMapping {
    entries: Vec<(String, String)>,
    expected: Vec<String>,
}

/// One line of the mapping table shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MappingEntry {
    /// Expected reference sample.
    pub expected: String,
    /// Imported name mapped onto it, `None` when not found.
    pub imported: Option<String>,
}

impl SampleMapping {
    fn with_expected(expected: Vec<String>) -> Self {
        Self {
            entries: Vec::new(),
            expected,
        }
    }

    /// Map `imported` onto `expected`; re-mapping an imported name
    /// overwrites its target in place.
    fn insert(&mut self, imported: String, expected: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(i, _)| *i == imported) {
            entry.1 = expected;
        } else {
            self.entries.push((imported, expected));
        }
    }

    /// Canonical name for an imported sample: its mapped expected name, or
    /// the normalized imported name when unmapped.
    #[must_use]
    pub fn canonical(&self, imported: &str) -> String {
        let key = normalize_sample_name(imported);
        self.entries
            .iter()
            .find(|(i, _)| *i == key)
            .map_or(key, |(_, e)| e.clone())
    }

    /// Whether an imported sample has a mapping.
    #[must_use]
    pub fn is_mapped(&self, imported: &str) -> bool {
        let key = normalize_sample_name(imported);
        self.entries.iter().any(|(i, _)| *i == key)
    }

    /// Imported name mapped onto `expected`, if any.
    #[must_use]
    pub fn imported_for(&self, expected: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e == expected)
            .map(|(i, _)| i.as_str())
    }

    /// Normalized expected names, in reference order.
    #[must_use]
    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    /// Expected → imported table, one entry per expected sample.
    #[must_use]
    pub fn table(&self) -> Vec<MappingEntry> {
        self.expected
            .iter()
            .map(|e| MappingEntry {
                expected: e.clone(),
                imported: self.imported_for(e).map(str::to_string),
            })
            .collect()
    }
}

// ── Two-phase resolution ─────────────────────────────────────────

/// Caller decision for an expected sample that was not auto-matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualChoice {
    /// Use this imported sample name.
    Imported(String),
    /// The sample is absent from the report.
    NotFound,
}

/// Auto-matching left some expected samples unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResolution {
    mapping: SampleMapping,
    unresolved: Vec<String>,
    candidates: Vec<String>,
}

impl PendingResolution {
    /// Expected names that need a [`ManualChoice`].
    #[must_use]
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Distinct imported names a choice may refer to.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The automatic part of the mapping.
    #[must_use]
    pub const fn partial(&self) -> &SampleMapping {
        &self.mapping
    }

    /// Complete the mapping with one decision per unresolved name.
    ///
    /// Keys and imported names in `decisions` are normalized before use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedSamples`] if an unresolved name has no
    /// decision and [`Error::InvalidInput`] if a decision names an imported
    /// sample that is not in the report.
    pub fn resolve(self, decisions: &BTreeMap<String, ManualChoice>) -> Result<SampleMapping> {
        let decisions: BTreeMap<String, &ManualChoice> = decisions
            .iter()
            .map(|(k, v)| (normalize_sample_name(k), v))
            .collect();
        let Self {
            mut mapping,
            unresolved,
            candidates,
        } = self;
        let mut missing = Vec::new();
        for expected in unresolved {
            match decisions.get(&expected) {
                None => missing.push(expected),
                Some(ManualChoice::NotFound) => {
                    tracing::info!(expected = %expected, "sample marked not found");
                }
                Some(ManualChoice::Imported(name)) => {
                    let imported = normalize_sample_name(name);
                    if !candidates.contains(&imported) {
                        return Err(Error::InvalidInput(format!(
                            "'{imported}' is not a sample name in the report"
                        )));
                    }
                    mapping.insert(imported, expected);
                }
            }
        }
        if !missing.is_empty() {
            return Err(Error::UnresolvedSamples(missing));
        }
        Ok(mapping)
    }
}

/// Outcome of automatic identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every expected sample was auto-matched.
    Resolved(SampleMapping),
    /// Some expected samples need a caller decision.
    Pending(PendingResolution),
}

impl Resolution {
    /// Finish resolution; decisions are only consulted when pending.
    ///
    /// # Errors
    ///
    /// See [`PendingResolution::resolve`].
    pub fn complete(self, decisions: &BTreeMap<String, ManualChoice>) -> Result<SampleMapping> {
        match self {
            Self::Resolved(mapping) => Ok(mapping),
            Self::Pending(pending) => pending.resolve(decisions),
        }
    }
}

/// Auto-match expected names against imported names.
///
/// `imported` may contain duplicates and un-normalized spellings; it is
/// reduced to distinct normalized names in first-seen order.
#[must_use]
pub fn resolve_identities(expected: &[String], imported: &[String]) -> Resolution {
    let expected: Vec<String> = expected.iter().map(|e| normalize_sample_name(e)).collect();
    let mut candidates: Vec<String> = Vec::new();
    for name in imported.iter().map(|n| normalize_sample_name(n)) {
        if !candidates.contains(&name) {
            candidates.push(name);
        }
    }

    let mut mapping = SampleMapping::with_expected(expected.clone());
    let mut unresolved = Vec::new();
    for name in expected {
        match closest_match(&name, &candidates, limits::NAME_MATCH_CUTOFF) {
            Some(hit) => {
                tracing::debug!(expected = %name, imported = hit, "auto-matched sample");
                mapping.insert(hit.to_string(), name);
            }
            None => unresolved.push(name),
        }
    }

    if unresolved.is_empty() {
        Resolution::Resolved(mapping)
    } else {
        tracing::warn!(count = unresolved.len(), "samples need manual mapping");
        Resolution::Pending(PendingResolution {
            mapping,
            unresolved,
            candidates,
        })
    }
}
