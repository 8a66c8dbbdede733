// SPDX-License-Identifier: AGPL-3.0-or-later
//! Output sinks for finished runs: console tables, TSV export and JSON.
//!
//! Column names carry the mode tag `X` (`A`, `P` or `S`):
//!
//! | Table | Columns |
//! |-------|---------|
//! | rows | `Set`, `Sample Name`, `Elements`, `Mean`, `Cert. Val.`, `SD`, `DEV`, `X_Limit`, `%DEV_X`, `X_Result` |
//! | summary | `Elements`, `X_Result`, `Sample_Count` |
//!
//! Undefined numbers are written as empty cells in TSV, `null` in JSON and
//! `NA` on the console.

use crate::error::{Error, Result};
use crate::limits;
use crate::qc::aggregate::{ElementSummary, ElementTotals, RowTotals};
use crate::qc::identity::MappingEntry;
use crate::qc::metrics::{round_to, EvaluatedRow, TestMode, Verdict};
use crate::qc::run::{RunContext, RunReport, RunWarning};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Decimals kept when printing derived values (DEV, limits, SD).
const VALUE_DECIMALS: i32 = 6;

// ── Columns ──────────────────────────────────────────────────────

/// Row-table header for `mode`.
#[must_use]
pub fn row_columns(mode: TestMode) -> Vec<String> {
    let tag = mode.tag();
    let mut cols: Vec<String> = ["Set", "Sample Name", "Elements", "Mean", "Cert. Val.", "SD", "DEV"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    cols.push(format!("{tag}_Limit"));
    cols.push(format!("%DEV_{tag}"));
    cols.push(format!("{tag}_Result"));
    cols
}

/// Summary-table header for `mode`.
#[must_use]
pub fn summary_columns(mode: TestMode) -> Vec<String> {
    vec![
        "Elements".to_string(),
        format!("{}_Result", mode.tag()),
        "Sample_Count".to_string(),
    ]
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{}", round_to(v, VALUE_DECIMALS)))
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| {
        format!("{v:.prec$}", prec = limits::PERCENT_DECIMALS.unsigned_abs() as usize)
    })
}

/// One row-table record, aligned with [`row_columns`].
#[must_use]
pub fn row_record(row: &EvaluatedRow) -> Vec<String> {
    vec![
        row.row.set.to_string(),
        row.row.sample.clone(),
        row.row.element.clone(),
        row.row.mean_text.clone(),
        row.row.certified_text.clone(),
        format_value(row.row.sd),
        format_value(row.eval.dev),
        format_value(row.eval.limit),
        format_percent(row.eval.percent),
        row.eval.verdict.to_string(),
    ]
}

/// One summary record, aligned with [`summary_columns`].
#[must_use]
pub fn summary_record(summary: &ElementSummary) -> Vec<String> {
    vec![
        summary.element.clone(),
        summary.verdict.to_string(),
        summary.sample_count.to_string(),
    ]
}

// ── TSV ──────────────────────────────────────────────────────────

fn tsv_field(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

fn write_tsv_line<W: Write>(out: &mut W, fields: &[String]) -> std::io::Result<()> {
    let line: Vec<String> = fields.iter().map(|f| tsv_field(f)).collect();
    writeln!(out, "{}", line.join("\t"))
}

/// Write the row table as TSV.
///
/// # Errors
///
/// Propagates writer errors.
pub fn write_rows_tsv<W: Write>(out: &mut W, report: &RunReport) -> std::io::Result<()> {
    write_tsv_line(out, &row_columns(report.context.mode))?;
    for row in &report.rows {
        write_tsv_line(out, &row_record(row))?;
    }
    Ok(())
}

/// Write the element summary as TSV.
///
/// # Errors
///
/// Propagates writer errors.
pub fn write_summary_tsv<W: Write>(out: &mut W, report: &RunReport) -> std::io::Result<()> {
    write_tsv_line(out, &summary_columns(report.context.mode))?;
    for summary in &report.summary {
        write_tsv_line(out, &summary_record(summary))?;
    }
    Ok(())
}

/// Write a table to `path` through `write`, attaching the path to I/O errors.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be created or written.
pub fn save_with<F>(path: &Path, report: &RunReport, write: F) -> Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<std::fs::File>, &RunReport) -> std::io::Result<()>,
{
    let io_err = |e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let file = std::fs::File::create(path).map_err(io_err)?;
    let mut out = std::io::BufWriter::new(file);
    write(&mut out, report).map_err(io_err)?;
    out.flush().map_err(io_err)?;
    tracing::info!(path = %path.display(), "wrote table");
    Ok(())
}

// ── JSON ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonRow<'a> {
    set: usize,
    sample: &'a str,
    matrix: Option<&'a str>,
    element: &'a str,
    mean: &'a str,
    certified: &'a str,
    sd: Option<f64>,
    cv: Option<f64>,
    dev: Option<f64>,
    limit: Option<f64>,
    percent: Option<f64>,
    verdict: Verdict,
}

impl<'a> From<&'a EvaluatedRow> for JsonRow<'a> {
    fn from(r: &'a EvaluatedRow) -> Self {
        Self {
            set: r.row.set,
            sample: &r.row.sample,
            matrix: r.row.matrix.as_deref(),
            element: &r.row.element,
            mean: &r.row.mean_text,
            certified: &r.row.certified_text,
            sd: r.row.sd,
            cv: r.eval.cv,
            dev: r.eval.dev,
            limit: r.eval.limit,
            percent: r.eval.percent,
            verdict: r.eval.verdict,
        }
    }
}

#[derive(Serialize)]
struct JsonRun<'a> {
    context: &'a RunContext,
    blocks_found: usize,
    expected_samples: usize,
    mapping: &'a [MappingEntry],
    warnings: &'a [RunWarning],
    rows: Vec<JsonRow<'a>>,
    summary: &'a [ElementSummary],
    element_totals: ElementTotals,
    row_totals: RowTotals,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    runs: Vec<JsonRun<'a>>,
}

/// Serialize one or more runs (e.g. Accuracy and Precision of the same
/// upload) as a pretty-printed JSON document `{ "runs": [...] }`.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn to_json(reports: &[RunReport]) -> Result<String> {
    let doc = JsonDocument {
        runs: reports
            .iter()
            .map(|r| JsonRun {
                context: &r.context,
                blocks_found: r.blocks_found,
                expected_samples: r.expected_samples,
                mapping: &r.mapping,
                warnings: &r.warnings,
                rows: r.rows.iter().map(JsonRow::from).collect(),
                summary: &r.summary,
                element_totals: r.element_totals,
                row_totals: r.row_totals,
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

// ── Console ──────────────────────────────────────────────────────

fn console_cell(field: &str) -> &str {
    if field.is_empty() {
        "NA"
    } else {
        field
    }
}

fn print_table(header: &[String], records: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for record in records {
        for (w, field) in widths.iter_mut().zip(record) {
            *w = (*w).max(console_cell(field).chars().count());
        }
    }
    let line = |fields: &[String]| {
        let cells: Vec<String> = fields
            .iter()
            .zip(&widths)
            .map(|(f, w)| format!("{:<w$}", console_cell(f), w = *w))
            .collect();
        println!("  {}", cells.join("  ").trim_end());
    };
    line(header);
    for record in records {
        line(record);
    }
}

/// Print a run to stdout: header, mapping, warnings, both tables, totals.
pub fn print_report(report: &RunReport) {
    let ctx = &report.context;
    println!("═══════════════════════════════════════════════════════════");
    println!("  APS {} verification", ctx.mode);
    println!("═══════════════════════════════════════════════════════════");
    if !ctx.operator.is_empty() {
        println!("  Operator:   {}", ctx.operator);
    }
    if !ctx.bench_no.is_empty() {
        println!("  Bench:      {}", ctx.bench_no);
    }
    println!("  Model:      {}", ctx.model);
    println!("  Base:       {} / {}", ctx.base, ctx.matrix);
    if let Some(lsd) = &ctx.last_standardization {
        println!("  Last std.:  {lsd}");
    }
    println!(
        "  Samples:    {} blocks, {} expected",
        report.blocks_found, report.expected_samples
    );

    println!("\n── Sample mapping ──");
    for entry in &report.mapping {
        println!(
            "  {:<24} ← {}",
            entry.expected,
            entry.imported.as_deref().unwrap_or("Not Found")
        );
    }

    if !report.warnings.is_empty() {
        println!("\n── Warnings ──");
        for warning in &report.warnings {
            println!("  [WARN]  {warning}");
        }
    }

    println!("\n── Results ──");
    let rows: Vec<Vec<String>> = report.rows.iter().map(row_record).collect();
    print_table(&row_columns(ctx.mode), &rows);

    println!("\n── Element summary ──");
    let summary: Vec<Vec<String>> = report.summary.iter().map(summary_record).collect();
    print_table(&summary_columns(ctx.mode), &summary);

    let t = report.element_totals;
    println!();
    println!(
        "  {} Pass: {} / {}",
        ctx.mode, report.row_totals.passed, report.row_totals.valid
    );
    println!(
        "  Elements: {} passed, {} failed, {} NA",
        t.passed, t.failed, t.not_assessed
    );
    let verdict = if t.failed == 0 && t.passed > 0 {
        "PASS"
    } else if t.failed == 0 {
        "NO VERDICT"
    } else {
        "FAIL"
    };
    println!("  RESULT: {verdict}");
    println!("═══════════════════════════════════════════════════════════");
}
