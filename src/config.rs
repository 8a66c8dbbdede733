// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run configuration: the session file and the reference data directory.
//!
//! A session is the operator's run header, written once at login and
//! reused across verification runs:
//!
//! ```json
//! { "username": "kim", "bench_no": "B-07", "lsd": "2026-03-01",
//!   "base": "Fe", "matrix": "Low alloy", "model": "ARL-4460" }
//! ```
//!
//! Reference tables live under a data directory (`APS_DATA_DIR`, else
//! `data/` next to the manifest):
//!
//! ```text
//! data/
//! ├── Precision_tables/Database_base_matrix.xlsx   sheet per base
//! └── Stability_tables/
//!     ├── <model>.xlsx                             sheet per base
//!     └── exclusion_list.txt
//! ```

use crate::error::{Error, Result};
use crate::io::reference::{ExclusionList, ReferenceData, SampleDatabase, ThresholdTable};
use crate::qc::metrics::TestMode;
use crate::qc::run::RunContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "APS_DATA_DIR";

/// Data directory used when [`DATA_DIR_ENV`] is unset, relative to the
/// crate manifest.
pub const DEFAULT_DATA_SUBPATH: &str = "data";

/// Operator session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Operator name.
    pub username: String,
    /// Bench / instrument identifier.
    pub bench_no: String,
    /// Last standardization date.
    pub lsd: Option<String>,
    /// Selected base.
    pub base: String,
    /// Selected matrix.
    pub matrix: String,
    /// Instrument model.
    pub model: String,
}

impl Session {
    /// Read a session JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened and
    /// [`Error::Json`] if it is not a valid session document.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let session: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        session.validate()?;
        Ok(session)
    }

    /// Parse a session from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed JSON and [`Error::InvalidInput`]
    /// if base, matrix or model is blank.
    pub fn from_json(text: &str) -> Result<Self> {
        let session: Self = serde_json::from_str(text)?;
        session.validate()?;
        Ok(session)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("base", &self.base),
            ("matrix", &self.matrix),
            ("model", &self.model),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("session field '{field}' is empty")));
            }
        }
        Ok(())
    }

    /// Run context for `mode`.
    #[must_use]
    pub fn context(&self, mode: TestMode) -> RunContext {
        RunContext {
            operator: self.username.clone(),
            bench_no: self.bench_no.clone(),
            base: self.base.clone(),
            matrix: self.matrix.clone(),
            model: self.model.clone(),
            last_standardization: self.lsd.clone(),
            mode,
        }
    }
}

/// Resolve a data directory using env-var override or manifest-relative
/// default.
#[must_use]
pub fn data_dir(env_var: &str, default_subpath: &str) -> PathBuf {
    std::env::var(env_var).map_or_else(
        |_| Path::new(env!("CARGO_MANIFEST_DIR")).join(default_subpath),
        PathBuf::from,
    )
}

/// Expected-sample database workbook.
#[must_use]
pub fn sample_database_path(data_dir: &Path) -> PathBuf {
    data_dir
        .join("Precision_tables")
        .join("Database_base_matrix.xlsx")
}

/// Stability threshold workbook for an instrument model.
#[must_use]
pub fn threshold_table_path(data_dir: &Path, model: &str) -> PathBuf {
    data_dir.join("Stability_tables").join(format!("{model}.xlsx"))
}

/// Stability exclusion list.
#[must_use]
pub fn exclusion_list_path(data_dir: &Path) -> PathBuf {
    data_dir.join("Stability_tables").join("exclusion_list.txt")
}

/// Load the reference tables a run in `ctx.mode` needs.
///
/// The sample database is always loaded. Stability modes also load the
/// model's threshold sheet for `ctx.base` and the exclusion list; other
/// modes get neither.
///
/// # Errors
///
/// Any I/O, workbook or missing-sheet error from the individual loaders.
pub fn load_references(ctx: &RunContext, data_dir: &Path) -> Result<ReferenceData> {
    let samples = SampleDatabase::load(&sample_database_path(data_dir))?;
    if !ctx.mode.is_stability() {
        return Ok(ReferenceData {
            samples,
            ..ReferenceData::default()
        });
    }
    let thresholds = ThresholdTable::load(&threshold_table_path(data_dir, &ctx.model), &ctx.base)?;
    let exclusions = ExclusionList::load(&exclusion_list_path(data_dir))?;
    tracing::info!(
        model = %ctx.model,
        base = %ctx.base,
        bands = thresholds.len(),
        excluded = exclusions.len(),
        "loaded stability references"
    );
    Ok(ReferenceData {
        samples,
        thresholds: Some(thresholds),
        exclusions,
    })
}
