// SPDX-License-Identifier: AGPL-3.0-or-later
//! Centralized verification policy constants.
//!
//! Every multiplier, cutoff and set count the verdict pipeline applies is
//! defined here with its meaning. No ad-hoc magic numbers in `qc`.
//!
//! # Constant categories
//!
//! | Category | Used by | Example |
//! |----------|---------|---------|
//! | Identity | [`crate::qc::identity`] | 0.9 fuzzy-match cutoff |
//! | Precision | [`crate::qc::metrics`] | 5% of CV |
//! | Stability | [`crate::qc::metrics`], [`crate::qc::run`] | ×1.5 / ×3, 8 / 16 sets |
//! | Validation | `validate_stability`, tests | 1e-12 analytical tolerance |

// ═══════════════════════════════════════════════════════════════════
// Identity resolution
// ═══════════════════════════════════════════════════════════════════

/// Minimum gestalt similarity for an automatic sample-name match.
///
/// `"NIST 1643F"` vs `"NIST-1643F"` scores exactly 0.9; `"CRM-1"` vs
/// `"CRM-2"` scores 0.8 and needs a manual decision.
pub const NAME_MATCH_CUTOFF: f64 = 0.9;

// ═══════════════════════════════════════════════════════════════════
// Acceptance-band normalization
// ═══════════════════════════════════════════════════════════════════

/// Divisor for acceptance figures stored as a 2-sigma band (`...2s`).
pub const TWO_SIGMA_DIVISOR: f64 = 2.0;

/// Divisor for acceptance figures stored as a 3-sigma band (`...3s`).
pub const THREE_SIGMA_DIVISOR: f64 = 3.0;

// ═══════════════════════════════════════════════════════════════════
// Precision
// ═══════════════════════════════════════════════════════════════════

/// Precision limit as a fraction of the comparison value: P = CV × 0.05.
pub const PRECISION_FRACTION: f64 = 0.05;

// ═══════════════════════════════════════════════════════════════════
// Stability
// ═══════════════════════════════════════════════════════════════════

/// Short-term stability multiplier on the resolved one-sigma limit.
pub const SHORT_TERM_MULTIPLIER: f64 = 1.5;

/// Long-term stability multiplier on the resolved one-sigma limit.
pub const LONG_TERM_MULTIPLIER: f64 = 3.0;

/// Multiplier for elements on the exclusion list, in every stability mode.
///
/// Takes precedence over [`SHORT_TERM_MULTIPLIER`] / [`LONG_TERM_MULTIPLIER`].
pub const EXCLUDED_ELEMENT_MULTIPLIER: f64 = 3.0;

/// Measurement sets a short-term stability report must contain.
pub const SHORT_TERM_SETS: usize = 8;

/// Measurement sets a long-term stability report must contain.
pub const LONG_TERM_SETS: usize = 16;

// ═══════════════════════════════════════════════════════════════════
// Reporting
// ═══════════════════════════════════════════════════════════════════

/// Decimal places kept in percentage-of-limit values.
pub const PERCENT_DECIMALS: i32 = 2;

// ═══════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════

/// Tolerance for hand-computed limits and deviations (f64 round-off only).
pub const ANALYTICAL_F64: f64 = 1e-12;
