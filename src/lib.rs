// SPDX-License-Identifier: AGPL-3.0-or-later

#![forbid(unsafe_code)]
#![deny(clippy::expect_used, clippy::unwrap_used)]

//! APS Verify: calibration verification for spectrometer reports.
//!
//! Instrument reports are exported as a flat grid of repeated sample
//! blocks. Each block lists per-element measurements of a certified
//! reference sample; this crate checks them against the certified values
//! and decides, element by element, whether the instrument passes.
//!
//! # Pipeline
//!
//! ```text
//!    ┌─────────────────────────────┐
//!    │  io (workbook / delimited)  │  calamine sheets, csv / tsv text
//!    └──────────┬──────────────────┘
//!               │ ReportGrid
//!    ┌──────────▼──────────────────┐
//!    │  qc::blocks                 │  marker-delimited sample blocks
//!    └──────────┬──────────────────┘
//!               │ Vec<SampleBlock> + expected samples (io::reference)
//!    ┌──────────▼──────────────────┐
//!    │  qc::identity               │  fuzzy match, manual fallback
//!    └──────────┬──────────────────┘
//!               │ SampleMapping
//!    ┌──────────▼──────────────────┐
//!    │  qc::metrics → aggregate    │  limits, verdicts, element rollup
//!    └──────────┬──────────────────┘
//!               │ RunReport
//!    ┌──────────▼──────────────────┐
//!    │  report                     │  console, TSV, JSON
//!    └─────────────────────────────┘
//! ```
//!
//! # Test modes
//!
//! | Mode | Metric | Limit |
//! |------|--------|-------|
//! | Accuracy | \|Cert − Mean\| | Acceptance band (1σ) |
//! | Precision | SD | 5% of CV |
//! | ShortTerm stability (8 sets) | \|Cert − Mean\| | band × 1.5 |
//! | LongTerm stability (16 sets) | \|Cert − Mean\| | band × 3 |
//!
//! Elements on the exclusion list always use ×3 in stability runs.

pub mod config;
pub mod error;
pub mod io;
pub mod limits;
pub mod qc;
pub mod report;
pub mod validation;
