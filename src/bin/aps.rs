// SPDX-License-Identifier: AGPL-3.0-or-later
//! Verify one instrument report against the reference tables.
//!
//! ```text
//! aps --session=session.json --report=run.xlsx --mode=shortterm \
//!     [--data=DIR] [--map=EXPECTED=IMPORTED]... [--not-found=EXPECTED]... \
//!     [--tsv=rows.tsv] [--summary-tsv=summary.tsv] [--json=report.json]
//! ```
//!
//! Modes: `accuracy`, `precision`, `ap` (both from one upload), `shortterm`,
//! `longterm`. Set `APS_LOG=debug` for pipeline tracing on stderr.
//!
//! Exit code 0 = no element failed, 1 = at least one element failed,
//! 2 = input error or sample names that still need `--map` / `--not-found`.

use aps_verify::config::{self, Session};
use aps_verify::error::{Error, Result};
use aps_verify::io;
use aps_verify::qc::identity::{ManualChoice, Resolution};
use aps_verify::qc::metrics::TestMode;
use aps_verify::qc::run::{self, RunReport, StagedRun};
use aps_verify::report;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: aps --session=FILE --report=FILE [--mode=accuracy|precision|ap|shortterm|longterm] \
[--data=DIR] [--map=EXPECTED=IMPORTED]... [--not-found=EXPECTED]... \
[--tsv=FILE] [--summary-tsv=FILE] [--json=FILE]";

/// Exit code for input errors and unresolved sample names.
const EXIT_INPUT: i32 = 2;

#[derive(Debug, Default)]
struct Args {
    session: Option<PathBuf>,
    report: Option<PathBuf>,
    modes: Vec<TestMode>,
    data: Option<PathBuf>,
    decisions: BTreeMap<String, ManualChoice>,
    tsv: Option<PathBuf>,
    summary_tsv: Option<PathBuf>,
    json: Option<PathBuf>,
}

fn parse_modes(value: &str) -> Result<Vec<TestMode>> {
    match value.trim().to_lowercase().as_str() {
        "ap" | "accuracy+precision" => Ok(vec![TestMode::Accuracy, TestMode::Precision]),
        other => Ok(vec![TestMode::from_arg(other)?]),
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| Error::InvalidInput(format!("expected --key=value, got '{arg}'")))?;
        match key {
            "--session" => parsed.session = Some(PathBuf::from(value)),
            "--report" => parsed.report = Some(PathBuf::from(value)),
            "--mode" => parsed.modes = parse_modes(value)?,
            "--data" => parsed.data = Some(PathBuf::from(value)),
            "--map" => {
                let (expected, imported) = value.split_once('=').ok_or_else(|| {
                    Error::InvalidInput(format!("--map needs EXPECTED=IMPORTED, got '{value}'"))
                })?;
                parsed.decisions.insert(
                    expected.to_string(),
                    ManualChoice::Imported(imported.to_string()),
                );
            }
            "--not-found" => {
                parsed
                    .decisions
                    .insert(value.to_string(), ManualChoice::NotFound);
            }
            "--tsv" => parsed.tsv = Some(PathBuf::from(value)),
            "--summary-tsv" => parsed.summary_tsv = Some(PathBuf::from(value)),
            "--json" => parsed.json = Some(PathBuf::from(value)),
            _ => return Err(Error::InvalidInput(format!("unknown flag '{key}'"))),
        }
    }
    if parsed.modes.is_empty() {
        parsed.modes.push(TestMode::Accuracy);
    }
    Ok(parsed)
}

/// `rows.tsv` → `rows_A.tsv` when several modes share one output flag.
fn tagged_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{tag}"),
    };
    path.with_file_name(name)
}

fn print_pending(staged: &StagedRun<'_>) {
    let Resolution::Pending(pending) = staged.resolution() else {
        return;
    };
    println!("── Samples needing a manual mapping ──");
    for name in pending.unresolved() {
        println!("  {name}");
    }
    println!("\n── Sample names in the report ──");
    for name in pending.candidates() {
        println!("  {name}");
    }
    println!("\n  Re-run with --map=EXPECTED=IMPORTED or --not-found=EXPECTED for each.");
}

fn write_outputs(args: &Args, reports: &[RunReport]) -> Result<()> {
    let many = reports.len() > 1;
    let target = |path: &Path, r: &RunReport| {
        if many {
            tagged_path(path, r.context.mode.tag())
        } else {
            path.to_path_buf()
        }
    };
    for r in reports {
        if let Some(path) = &args.tsv {
            report::save_with(&target(path, r), r, |out, r| report::write_rows_tsv(out, r))?;
        }
        if let Some(path) = &args.summary_tsv {
            report::save_with(&target(path, r), r, |out, r| {
                report::write_summary_tsv(out, r)
            })?;
        }
    }
    if let Some(path) = &args.json {
        let json = report::to_json(reports)?;
        std::fs::write(path, json).map_err(|e| Error::Io {
            path: path.clone(),
            source: e,
        })?;
    }
    Ok(())
}

fn execute(args: &Args) -> Result<i32> {
    let session_path = args
        .session
        .as_deref()
        .ok_or_else(|| Error::InvalidInput("--session is required".into()))?;
    let report_path = args
        .report
        .as_deref()
        .ok_or_else(|| Error::InvalidInput("--report is required".into()))?;
    let primary = args.modes[0];

    let session = Session::load(session_path)?;
    let ctx = session.context(primary);
    let data_dir = args
        .data
        .clone()
        .unwrap_or_else(|| config::data_dir(config::DATA_DIR_ENV, config::DEFAULT_DATA_SUBPATH));
    let refs = config::load_references(&ctx, &data_dir)?;
    let grid = io::read_report(report_path)?;

    let staged = run::stage(ctx, &grid, &refs)?;
    let mapping = match staged.mapping(&args.decisions) {
        Ok(mapping) => mapping,
        Err(Error::UnresolvedSamples(names)) => {
            tracing::warn!(unresolved = names.len(), "run needs manual sample mapping");
            print_pending(&staged);
            return Ok(EXIT_INPUT);
        }
        Err(e) => return Err(e),
    };

    let reports = args
        .modes
        .iter()
        .map(|&mode| staged.evaluate(&mapping, mode))
        .collect::<Result<Vec<_>>>()?;
    for r in &reports {
        report::print_report(r);
    }
    write_outputs(args, &reports)?;

    let failed = reports.iter().any(|r| r.element_totals.failed > 0);
    Ok(i32::from(failed))
}

fn main() {
    let filter = EnvFilter::try_from_env("APS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = match parse_args(std::env::args().skip(1)) {
        Ok(args) => execute(&args).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            EXIT_INPUT
        }),
        Err(e) => {
            eprintln!("error: {e}\n{USAGE}");
            EXIT_INPUT
        }
    };
    std::process::exit(code);
}
