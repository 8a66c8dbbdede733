// SPDX-License-Identifier: AGPL-3.0-or-later
//! Validation harness for known-answer verification scenarios.
//!
//! Used by validation binaries (`validate_stability`) to replay documented
//! calibration scenarios and compare every limit, percentage and verdict
//! against hand-computed expectations. Each check prints a formatted
//! pass/fail line with the actual and expected value.
//!
//! Every validation binary follows the same contract:
//! - Hardcoded expected values worked out by hand from the scenario
//! - Explicit pass/fail per check with human-readable output
//! - Exit code 0 = all passed, 1 = at least one failed
//!
//! Prefer the [`Validator`] struct over bare [`check`] calls; it tracks
//! pass/fail counts.

// ── Standalone helpers ────────────────────────────────────────

/// Compare `actual` against `expected` within absolute `tolerance`.
///
/// Prints a formatted `[OK]` or `[FAIL]` line and returns whether
/// the check passed. Tolerance of `0.0` requires exact match.
///
/// ```
/// use aps_verify::validation::check;
///
/// assert!(check("S_Limit", 0.6, 0.6, 1e-12));
/// assert!(!check("deliberate fail", 2.0, 1.0, 0.5));
/// ```
#[must_use]
pub fn check(label: &str, actual: f64, expected: f64, tolerance: f64) -> bool {
    let pass = (actual - expected).abs() <= tolerance;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual:.6} (expected {expected:.6}, tol {tolerance:.6})");
    pass
}

/// Compare an exact count.
///
/// ```
/// use aps_verify::validation::check_count;
///
/// assert!(check_count("sets", 8, 8));
/// assert!(!check_count("mismatched", 7, 8));
/// ```
#[must_use]
pub fn check_count(label: &str, actual: usize, expected: usize) -> bool {
    let pass = actual == expected;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual} (expected {expected})");
    pass
}

/// Compare a rendered label (verdicts, sample names).
#[must_use]
pub fn check_text(label: &str, actual: &str, expected: &str) -> bool {
    let pass = actual == expected;
    let tag = if pass { "OK" } else { "FAIL" };
    println!("  [{tag}]  {label}: {actual} (expected {expected})");
    pass
}

/// Print summary and return whether all checks passed.
#[must_use]
pub fn print_result(name: &str, passed: u32, total: u32) -> bool {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("  {name}: {passed}/{total} checks passed");
    if passed == total {
        println!("  RESULT: PASS");
    } else {
        println!("  RESULT: FAIL ({} checks failed)", total - passed);
    }
    println!("═══════════════════════════════════════════════════════════");
    passed == total
}

// ── Validator: structured check accumulator ───────────────────

/// Accumulated validation state.
///
/// ```
/// use aps_verify::validation::Validator;
///
/// let mut v = Validator::new("doc-test");
/// v.check("%DEV_S", 33.33, 33.33, 1e-9);
/// v.check_count("sets", 8, 8);
/// v.check_text("verdict", "Pass", "Pass");
/// assert_eq!(v.counts(), (3, 3));
/// ```
pub struct Validator {
    name: String,
    passed: u32,
    total: u32,
}

impl Validator {
    /// Create a new validator and print its banner.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        println!("═══════════════════════════════════════════════════════════");
        println!("  {name}");
        println!("═══════════════════════════════════════════════════════════\n");
        Self {
            name,
            passed: 0,
            total: 0,
        }
    }

    /// Print a section header (no check counted).
    pub fn section(&self, label: &str) {
        println!("\n{label}");
    }

    fn record(&mut self, pass: bool) {
        self.total += 1;
        if pass {
            self.passed += 1;
        }
    }

    /// Check an f64 value against expected within tolerance.
    pub fn check(&mut self, label: &str, actual: f64, expected: f64, tolerance: f64) {
        self.record(check(label, actual, expected, tolerance));
    }

    /// Check an optional value; `None` counts as a failure.
    pub fn check_some(&mut self, label: &str, actual: Option<f64>, expected: f64, tolerance: f64) {
        match actual {
            Some(value) => self.check(label, value, expected, tolerance),
            None => {
                println!("  [FAIL]  {label}: NA (expected {expected:.6})");
                self.record(false);
            }
        }
    }

    /// Check an exact count.
    pub fn check_count(&mut self, label: &str, actual: usize, expected: usize) {
        self.record(check_count(label, actual, expected));
    }

    /// Check a rendered label.
    pub fn check_text(&mut self, label: &str, actual: &str, expected: &str) {
        self.record(check_text(label, actual, expected));
    }

    /// Current (passed, total).
    #[must_use]
    pub const fn counts(&self) -> (u32, u32) {
        (self.passed, self.total)
    }

    /// Print summary and exit with 0 (pass) or 1 (fail).
    pub fn finish(self) -> ! {
        let ok = print_result(&self.name, self.passed, self.total);
        std::process::exit(i32::from(!ok))
    }
}
