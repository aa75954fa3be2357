//! Report export: per-run CSV table and per-event JSON summary.
//!
//! - `reports.csv`: one row per run (strict run first, then seeded runs)
//! - `summary.json`: per event, the strict run and the sweep summary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::monte_carlo::{EventSweep, SweepSummary};
use crate::simulator::EventReport;

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

/// Export runs as CSV.
///
/// Columns: event_id, symbol, side, seed, slippage, exit_slippage,
/// window_secs, anchor_index, confirmed, confirm_index, entry_price,
/// exit_price, exit_reason, pnl_pct, peak_return
pub fn export_reports_csv<'a, I>(reports: I) -> Result<String>
where
    I: IntoIterator<Item = &'a EventReport>,
{
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "event_id",
        "symbol",
        "side",
        "seed",
        "slippage",
        "exit_slippage",
        "window_secs",
        "anchor_index",
        "confirmed",
        "confirm_index",
        "entry_price",
        "exit_price",
        "exit_reason",
        "pnl_pct",
        "peak_return",
    ])?;

    for r in reports {
        wtr.write_record([
            r.event_id.as_str(),
            &r.symbol,
            r.side.as_str(),
            &r.seed.map(|s| s.to_string()).unwrap_or_default(),
            &format!("{:.6}", r.slippage),
            &format!("{:.6}", r.exit_slippage),
            &r.window_secs.to_string(),
            &r.anchor_index.to_string(),
            &r.confirmed.to_string(),
            &r.confirm_index.map(|i| i.to_string()).unwrap_or_default(),
            &opt(r.entry_price),
            &opt(r.exit_price),
            &r.exit_reason.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            &format!("{:.6}", r.pnl_pct),
            &format!("{:.6}", r.peak_return),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[derive(Debug, Serialize)]
struct EventSummaryRecord<'a> {
    event_id: &'a str,
    symbol: &'a str,
    strict: &'a EventReport,
    summary: &'a SweepSummary,
}

pub fn export_summary_json(sweeps: &[EventSweep]) -> Result<String> {
    let records: Vec<EventSummaryRecord<'_>> = sweeps
        .iter()
        .map(|s| EventSummaryRecord {
            event_id: s.event_id.as_str(),
            symbol: &s.symbol,
            strict: &s.strict,
            summary: &s.summary,
        })
        .collect();
    serde_json::to_string_pretty(&records).context("failed to serialize sweep summary")
}

/// Write `reports.csv` and `summary.json` under `output_dir`.
pub fn save_reports(sweeps: &[EventSweep], output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let rows = sweeps
        .iter()
        .flat_map(|s| std::iter::once(&s.strict).chain(s.runs.iter()));
    let csv_path = output_dir.join("reports.csv");
    std::fs::write(&csv_path, export_reports_csv(rows)?)
        .with_context(|| format!("failed to write {}", csv_path.display()))?;

    let json_path = output_dir.join("summary.json");
    std::fs::write(&json_path, export_summary_json(sweeps)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    Ok(vec![csv_path, json_path])
}
