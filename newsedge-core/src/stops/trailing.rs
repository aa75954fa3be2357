//! Per-position trailing stop state machine.
//!
//! `OPEN` until a tick's adverse extreme crosses the stop, then `CLOSED`.
//! Each tick:
//! 1. ratchet the peak price and peak return from the tick's favorable extreme
//! 2. select the tier from the peak return (tiers never downgrade)
//! 3. compute the tier's candidate stop and ratchet it into the current stop
//! 4. exit if the adverse extreme (low for longs, high for shorts) crossed the stop

use serde::{Deserialize, Serialize};

use super::ratchet::RatchetState;
use super::tiers::{StopConfig, StopTier, TierSchedule};
use crate::domain::{ExitReason, Side, Tick};

/// Mutable stop state, owned by exactly one `TrailingStop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    pub stop_price: f64,
    /// Highest unrealized return ever reached (non-decreasing).
    pub peak_return: f64,
    /// Most favorable price seen since entry.
    pub peak_price: f64,
    pub tier: StopTier,
}

/// A stop breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopExit {
    pub stop_price: f64,
    /// Stop price with the exit slippage penalty applied.
    pub exit_price: f64,
    pub tier: StopTier,
    pub peak_return: f64,
}

impl StopExit {
    pub fn reason(&self) -> ExitReason {
        ExitReason::Stop {
            tier: self.tier,
            peak_return: self.peak_return,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopDecision {
    Hold(StopState),
    Exit(StopExit),
}

#[derive(Debug, Clone)]
pub struct TrailingStop {
    side: Side,
    entry_price: f64,
    initial_width: f64,
    exit_slippage: f64,
    schedule: TierSchedule,
    ratchet: RatchetState,
    state: StopState,
    closed: Option<StopExit>,
    ticks: usize,
}

impl TrailingStop {
    /// Open stop tracking for a fill at `entry_price`.
    ///
    /// `range_pct` is the realized range observed during confirmation; it only
    /// matters when the config carries a volatility multiplier.
    pub fn new(side: Side, entry_price: f64, config: &StopConfig, range_pct: Option<f64>) -> Self {
        let initial_width = config.initial_width(range_pct);
        let schedule = config.tiers.clone();
        let initial_stop =
            schedule.candidate(StopTier::Initial, side, entry_price, entry_price, initial_width);
        Self {
            side,
            entry_price,
            initial_width,
            exit_slippage: config.exit_slippage,
            schedule,
            ratchet: RatchetState::with_initial_level(side, initial_stop),
            state: StopState {
                stop_price: initial_stop,
                peak_return: 0.0,
                peak_price: entry_price,
                tier: StopTier::Initial,
            },
            closed: None,
            ticks: 0,
        }
    }

    pub fn on_tick(&mut self, tick: &Tick) -> StopDecision {
        if let Some(exit) = &self.closed {
            return StopDecision::Exit(exit.clone());
        }
        self.ticks += 1;

        let (favorable, adverse) = match self.side {
            Side::Long => (tick.high, tick.low),
            Side::Short => (tick.low, tick.high),
        };

        let improved = match self.side {
            Side::Long => favorable > self.state.peak_price,
            Side::Short => favorable < self.state.peak_price,
        };
        if improved {
            self.state.peak_price = favorable;
        }
        let run_up = self.side.directional_return(self.entry_price, self.state.peak_price);
        self.state.peak_return = self.state.peak_return.max(run_up);
        self.state.tier = self.state.tier.max(self.schedule.tier_for(self.state.peak_return));

        let candidate = self.schedule.candidate(
            self.state.tier,
            self.side,
            self.entry_price,
            self.state.peak_price,
            self.initial_width,
        );
        self.state.stop_price = self.ratchet.apply(candidate);

        let breached = match self.side {
            Side::Long => adverse <= self.state.stop_price,
            Side::Short => adverse >= self.state.stop_price,
        };
        if !breached {
            return StopDecision::Hold(self.state.clone());
        }

        let exit_price = match self.side {
            Side::Long => self.state.stop_price * (1.0 - self.exit_slippage),
            Side::Short => self.state.stop_price * (1.0 + self.exit_slippage),
        };
        let exit = StopExit {
            stop_price: self.state.stop_price,
            exit_price,
            tier: self.state.tier,
            peak_return: self.state.peak_return,
        };
        self.closed = Some(exit.clone());
        StopDecision::Exit(exit)
    }

    pub fn state(&self) -> &StopState {
        &self.state
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn initial_width(&self) -> f64 {
        self.initial_width
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Ticks processed while open.
    pub fn ticks(&self) -> usize {
        self.ticks
    }
}
