// SPDX-License-Identifier: AGPL-3.0-or-later
//! Verification pipeline: block scanning, identity resolution, metric
//! evaluation and per-element aggregation.
//!
//! | Stage | Module |
//! |-------|--------|
//! | Split the report grid into sample blocks | [`blocks`] |
//! | Map report sample names onto expected samples | [`identity`] |
//! | Clean rows, compute limits and verdicts | [`metrics`] |
//! | Roll row verdicts up per element | [`aggregate`] |
//! | Two-phase run orchestration | [`run`] |

pub mod aggregate;
pub mod blocks;
pub mod identity;
pub mod metrics;
pub mod run;
