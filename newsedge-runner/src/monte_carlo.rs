//! Monte Carlo perturbation: sensitivity of one event to slippage and
//! confirmation-window assumptions.
//!
//! Each iteration gets its own seed from the `RngHierarchy`, so every draw is
//! a function of `(master_seed, event_id, iteration)` alone. Iterations run in
//! parallel with rayon and are collected in iteration order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use newsedge_core::domain::SignalId;

use crate::rng::RngHierarchy;
use crate::simulator::{EventReport, SimError, SimMode, Simulator};
use crate::ticks::Event;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    /// Seeded runs per event.
    pub seeds: usize,
    pub master_seed: u64,
    /// Multiplicative range applied to entry and exit slippage: (min, max).
    pub slippage_factor: (f64, f64),
    /// Multiplicative range applied to the confirmation window: (min, max).
    pub window_factor: (f64, f64),
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self {
            seeds: 100,
            master_seed: 42,
            slippage_factor: (0.5, 2.0),
            window_factor: (0.75, 1.25),
        }
    }
}

impl PerturbationConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, (lo, hi)) in [
            ("slippage_factor", self.slippage_factor),
            ("window_factor", self.window_factor),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
                return Err(format!("{name} must satisfy 0 < min <= max, got ({lo}, {hi})"));
            }
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Distribution of outcomes across seeded runs of one event.
///
/// P&L statistics cover confirmed runs only; an unconfirmed run never trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub runs: usize,
    pub confirmed: usize,
    pub mean_pnl_pct: f64,
    /// Sample variance (n - 1); zero with fewer than two trades.
    pub variance_pnl_pct: f64,
    pub win_rate: f64,
    pub mean_peak_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSweep {
    pub event_id: SignalId,
    pub symbol: String,
    /// The unperturbed run, for comparison against live behavior.
    pub strict: EventReport,
    pub runs: Vec<EventReport>,
    pub summary: SweepSummary,
}

// ─── Sweeps ──────────────────────────────────────────────────────────

pub fn sweep_event(simulator: &Simulator, event: &Event) -> Result<EventSweep, SimError> {
    let config = simulator.perturbation();
    let hierarchy = RngHierarchy::new(config.master_seed);
    let strict = simulator.run(event, SimMode::Strict)?;

    let runs = (0..config.seeds as u64)
        .into_par_iter()
        .map(|i| simulator.run(event, SimMode::Seeded(hierarchy.sub_seed(&event.id, i))))
        .collect::<Result<Vec<_>, _>>()?;

    let summary = summarize(&runs);
    info!(
        event_id = %event.id,
        symbol = %event.signal.symbol,
        runs = summary.runs,
        confirmed = summary.confirmed,
        mean_pnl_pct = summary.mean_pnl_pct,
        "event sweep complete"
    );
    Ok(EventSweep {
        event_id: event.id.clone(),
        symbol: event.signal.symbol.clone(),
        strict,
        runs,
        summary,
    })
}

/// Sweep every event in order.
pub fn sweep_events(simulator: &Simulator, events: &[Event]) -> Result<Vec<EventSweep>, SimError> {
    events.iter().map(|e| sweep_event(simulator, e)).collect()
}

pub fn summarize(reports: &[EventReport]) -> SweepSummary {
    let trades: Vec<&EventReport> = reports.iter().filter(|r| r.confirmed).collect();
    let n = trades.len();
    if n == 0 {
        return SweepSummary {
            runs: reports.len(),
            confirmed: 0,
            mean_pnl_pct: 0.0,
            variance_pnl_pct: 0.0,
            win_rate: 0.0,
            mean_peak_return: 0.0,
        };
    }
    let mean = trades.iter().map(|r| r.pnl_pct).sum::<f64>() / n as f64;
    let variance = if n > 1 {
        trades.iter().map(|r| (r.pnl_pct - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let winners = trades.iter().filter(|r| r.pnl_pct > 0.0).count();
    SweepSummary {
        runs: reports.len(),
        confirmed: n,
        mean_pnl_pct: mean,
        variance_pnl_pct: variance,
        win_rate: winners as f64 / n as f64,
        mean_peak_return: trades.iter().map(|r| r.peak_return).sum::<f64>() / n as f64,
    }
}
