//! Backtest simulator.
//!
//! Replays the live confirmation and trailing-stop logic over a recorded tick
//! window. Both phases drive the same `ConfirmationGate` and `TrailingStop`
//! the live engine uses; what differs is the clock (tick index instead of
//! wall time), the anchor (hindsight alignment), optional parameter
//! perturbation, and a bounded stop horizon.
//!
//! Per run:
//! 1. anchor at the tick of peak volatility; the start price is its open
//! 2. sample closes of ticks `anchor..anchor + window` through the gate
//! 3. enter at the confirming close plus entry slippage
//! 4. feed up to `horizon_ticks` following ticks to the trailing stop; if they
//!    run out, close at the last close with reason `time`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use newsedge_core::config::EngineConfig;
use newsedge_core::confirm::{ConfirmationGate, ConfirmationResult};
use newsedge_core::domain::{ExitReason, Price, Side, SignalId};
use newsedge_core::stops::{StopConfig, StopDecision, TrailingStop};

use crate::alignment::{find_event_anchor, Anchor};
use crate::config::{validate_sections, ConfigError};
use crate::monte_carlo::PerturbationConfig;
use crate::ticks::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Maximum ticks the stop is managed for after entry.
    pub horizon_ticks: usize,
    /// Ticks ignored at each edge by hindsight alignment.
    pub guard_ticks: usize,
    /// Base entry fill penalty against the confirming price.
    pub entry_slippage: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            horizon_ticks: 3_600,
            guard_ticks: 30,
            entry_slippage: 0.001,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.horizon_ticks == 0 {
            return Err("horizon_ticks must be > 0".into());
        }
        if !(0.0..0.5).contains(&self.entry_slippage) {
            return Err(format!(
                "entry_slippage must be in [0, 0.5), got {}",
                self.entry_slippage
            ));
        }
        Ok(())
    }
}

/// How a run picks its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMode {
    /// Base parameters, no randomness.
    Strict,
    /// Slippage and window drawn from the perturbation ranges.
    Seeded(u64),
}

impl SimMode {
    pub fn seed(self) -> Option<u64> {
        match self {
            SimMode::Strict => None,
            SimMode::Seeded(seed) => Some(seed),
        }
    }
}

/// Parameters actually used by one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    pub slippage_factor: f64,
    pub entry_slippage: f64,
    pub exit_slippage: f64,
    pub window_secs: u64,
}

/// One simulated run of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventReport {
    pub event_id: SignalId,
    pub symbol: String,
    pub side: Side,
    pub seed: Option<u64>,
    pub slippage: f64,
    pub exit_slippage: f64,
    pub window_secs: u64,
    pub anchor_index: usize,
    pub confirmed: bool,
    pub confirm_index: Option<usize>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub pnl_pct: f64,
    pub peak_return: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("event {0} has no ticks")]
    NoTicks(SignalId),
    #[error("event {event_id}: no valid start price at anchor tick {index}")]
    InvalidStartPrice { event_id: SignalId, index: usize },
}

#[derive(Debug, Clone)]
pub struct Simulator {
    engine: EngineConfig,
    simulation: SimulationConfig,
    perturbation: PerturbationConfig,
}

impl Simulator {
    /// Rejects configs that fail validation, so `params` can draw from the
    /// perturbation ranges without checking them.
    pub fn new(
        engine: EngineConfig,
        simulation: SimulationConfig,
        perturbation: PerturbationConfig,
    ) -> Result<Self, ConfigError> {
        validate_sections(&engine, &simulation, &perturbation)?;
        Ok(Self {
            engine,
            simulation,
            perturbation,
        })
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn perturbation(&self) -> &PerturbationConfig {
        &self.perturbation
    }

    /// Resolve run parameters. `Strict` is the unperturbed base; `Seeded`
    /// draws a slippage factor and a window factor from the seed alone.
    pub fn params(&self, mode: SimMode) -> SimParams {
        let base_window = self.engine.confirmation.window_secs;
        let (slippage_factor, window_secs) = match mode {
            SimMode::Strict => (1.0, base_window),
            SimMode::Seeded(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                let (slo, shi) = self.perturbation.slippage_factor;
                let (wlo, whi) = self.perturbation.window_factor;
                let slippage_factor = rng.gen_range(slo..=shi);
                let window_factor = rng.gen_range(wlo..=whi);
                let window = (base_window as f64 * window_factor).round().max(1.0) as u64;
                (slippage_factor, window)
            }
        };
        SimParams {
            slippage_factor,
            entry_slippage: self.simulation.entry_slippage * slippage_factor,
            exit_slippage: self.engine.stops.exit_slippage * slippage_factor,
            window_secs,
        }
    }

    pub fn run(&self, event: &Event, mode: SimMode) -> Result<EventReport, SimError> {
        let params = self.params(mode);
        self.run_with(event, mode.seed(), &params)
    }

    pub fn run_with(
        &self,
        event: &Event,
        seed: Option<u64>,
        params: &SimParams,
    ) -> Result<EventReport, SimError> {
        let ticks = &event.ticks;
        if ticks.is_empty() {
            return Err(SimError::NoTicks(event.id.clone()));
        }
        let side = event.signal.direction;
        let Anchor { index: anchor, .. } =
            find_event_anchor(ticks, event.signal.timestamp, self.simulation.guard_ticks);
        let start = Price::new(ticks[anchor].open).ok_or_else(|| SimError::InvalidStartPrice {
            event_id: event.id.clone(),
            index: anchor,
        })?;

        let mut report = EventReport {
            event_id: event.id.clone(),
            symbol: event.signal.symbol.clone(),
            side,
            seed,
            slippage: params.entry_slippage,
            exit_slippage: params.exit_slippage,
            window_secs: params.window_secs,
            anchor_index: anchor,
            confirmed: false,
            confirm_index: None,
            entry_price: None,
            exit_price: None,
            exit_reason: None,
            pnl_pct: 0.0,
            peak_return: 0.0,
        };

        // confirmation: one sample per tick, tick i is i seconds after the anchor
        let mut gate =
            ConfirmationGate::new(side, start, self.engine.confirmation.threshold_pct);
        let mut confirmation = None;
        let window_end = anchor.saturating_add(params.window_secs as usize).min(ticks.len());
        for (idx, tick) in ticks.iter().enumerate().take(window_end).skip(anchor) {
            let Some(price) = Price::new(tick.close) else {
                continue;
            };
            let elapsed = Duration::from_secs((idx - anchor) as u64);
            if let Some(result) = gate.observe(price, elapsed) {
                confirmation = Some((idx, result));
                break;
            }
        }
        let Some((confirm_idx, result)) = confirmation else {
            return Ok(report);
        };
        let ConfirmationResult::Confirmed {
            price: confirm_price,
            range_pct,
            ..
        } = result
        else {
            return Ok(report);
        };

        let entry = match side {
            Side::Long => confirm_price * (1.0 + params.entry_slippage),
            Side::Short => confirm_price * (1.0 - params.entry_slippage),
        };
        let stop_config = StopConfig {
            exit_slippage: params.exit_slippage,
            ..self.engine.stops.clone()
        };
        let mut stop = TrailingStop::new(side, entry, &stop_config, Some(range_pct));

        let horizon_end = confirm_idx
            .saturating_add(1)
            .saturating_add(self.simulation.horizon_ticks)
            .min(ticks.len());
        let mut exit = None;
        for tick in &ticks[confirm_idx + 1..horizon_end] {
            if let StopDecision::Exit(stop_exit) = stop.on_tick(tick) {
                exit = Some((stop_exit.exit_price, stop_exit.reason()));
                break;
            }
        }
        let (exit_price, exit_reason) = exit.unwrap_or_else(|| {
            let last_close = ticks[horizon_end.max(confirm_idx + 1) - 1].close;
            (
                last_close,
                ExitReason::Time {
                    peak_return: stop.state().peak_return,
                },
            )
        });

        report.confirmed = true;
        report.confirm_index = Some(confirm_idx);
        report.entry_price = Some(entry);
        report.exit_price = Some(exit_price);
        report.peak_return = exit_reason.peak_return();
        report.exit_reason = Some(exit_reason);
        report.pnl_pct = side.directional_return(entry, exit_price);
        Ok(report)
    }
}
