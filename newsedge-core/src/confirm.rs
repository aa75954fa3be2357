//! Confirmation: does the predicted move materialize inside the window?
//!
//! `ConfirmationGate` is the pure rule: fed prices one tick at a time, it
//! confirms on the first tick whose directional move from the start price
//! reaches the threshold. `ConfirmationMonitor` samples a gateway once per
//! poll interval and feeds the gate until the window elapses. The backtest
//! simulator feeds the same gate from recorded ticks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::domain::{Price, Side, Signal};
use crate::gateway::Gateway;

/// Tolerance for threshold comparisons on computed moves.
const EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub window_secs: u64,
    /// Required directional move as a fraction (0.002 = 0.20%).
    pub threshold_pct: f64,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            threshold_pct: 0.002,
            poll_interval_ms: 1000,
        }
    }
}

impl ConfirmationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.window_secs == 0 {
            return Err("window_secs must be > 0".into());
        }
        if !(self.threshold_pct.is_finite() && self.threshold_pct >= 0.0) {
            return Err(format!("threshold_pct must be >= 0, got {}", self.threshold_pct));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationResult {
    Confirmed {
        start_price: f64,
        price: f64,
        elapsed: Duration,
        /// Zero-based index of the confirming sample.
        tick: usize,
        move_pct: f64,
        /// (max - min) / start over every price seen, start included.
        range_pct: f64,
    },
    Expired {
        /// `None` when no valid start price could be read.
        start_price: Option<f64>,
        ticks_sampled: usize,
        best_move: f64,
    },
}

impl ConfirmationResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationResult::Confirmed { .. })
    }

    pub fn range_pct(&self) -> Option<f64> {
        match self {
            ConfirmationResult::Confirmed { range_pct, .. } => Some(*range_pct),
            ConfirmationResult::Expired { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    direction: Side,
    start_price: f64,
    threshold: f64,
    ticks: usize,
    min_seen: f64,
    max_seen: f64,
    best_move: f64,
}

impl ConfirmationGate {
    pub fn new(direction: Side, start_price: Price, threshold: f64) -> Self {
        let p = start_price.get();
        Self {
            direction,
            start_price: p,
            threshold,
            ticks: 0,
            min_seen: p,
            max_seen: p,
            best_move: f64::NEG_INFINITY,
        }
    }

    pub fn directional_move(&self, price: f64) -> f64 {
        self.direction.directional_return(self.start_price, price)
    }

    /// Feed one valid sample. Returns `Some` on confirmation.
    pub fn observe(&mut self, price: Price, elapsed: Duration) -> Option<ConfirmationResult> {
        let p = price.get();
        let tick = self.ticks;
        self.ticks += 1;
        self.min_seen = self.min_seen.min(p);
        self.max_seen = self.max_seen.max(p);

        let move_pct = self.directional_move(p);
        self.best_move = self.best_move.max(move_pct);
        if move_pct + EPS < self.threshold {
            return None;
        }
        Some(ConfirmationResult::Confirmed {
            start_price: self.start_price,
            price: p,
            elapsed,
            tick,
            move_pct,
            range_pct: (self.max_seen - self.min_seen) / self.start_price,
        })
    }

    pub fn expire(&self) -> ConfirmationResult {
        ConfirmationResult::Expired {
            start_price: Some(self.start_price),
            ticks_sampled: self.ticks,
            best_move: if self.ticks == 0 { 0.0 } else { self.best_move },
        }
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }
}

pub struct ConfirmationMonitor {
    gateway: Arc<Gateway>,
    poll_interval: Duration,
}

impl ConfirmationMonitor {
    pub fn new(gateway: Arc<Gateway>, poll_interval: Duration) -> Self {
        Self {
            gateway,
            poll_interval,
        }
    }

    /// Sample the gateway until the move confirms or `window` elapses.
    ///
    /// An unreadable start price expires immediately. Unreadable samples are
    /// skipped and cost only their own interval.
    pub async fn await_confirmation(
        &self,
        signal: &Signal,
        window: Duration,
        threshold_pct: f64,
    ) -> ConfirmationResult {
        let Some(start_price) = self.gateway.price(&signal.symbol).await else {
            info!(symbol = %signal.symbol, "no start price; confirmation expired");
            return ConfirmationResult::Expired {
                start_price: None,
                ticks_sampled: 0,
                best_move: 0.0,
            };
        };

        let mut gate = ConfirmationGate::new(signal.direction, start_price, threshold_pct);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let started = Instant::now();

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();
            if elapsed >= window {
                break;
            }
            let Some(price) = self.gateway.price(&signal.symbol).await else {
                debug!(symbol = %signal.symbol, "confirmation sample skipped: no price");
                continue;
            };
            if let Some(result) = gate.observe(price, elapsed) {
                info!(
                    symbol = %signal.symbol,
                    start = start_price.get(),
                    price = price.get(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "move confirmed"
                );
                return result;
            }
        }

        let result = gate.expire();
        info!(symbol = %signal.symbol, ticks = gate.ticks(), "confirmation window expired");
        result
    }
}
