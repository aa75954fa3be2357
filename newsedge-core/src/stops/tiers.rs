//! Stop tiers, keyed to the position's peak unrealized return.
//!
//! | Tier      | Peak return | Long stop                   |
//! |-----------|-------------|-----------------------------|
//! | Initial   | < 1.5%      | `entry * (1 - width)`       |
//! | Breakeven | >= 1.5%     | `entry * 1.002`             |
//! | Lock      | >= 3.0%     | `peak * (1 - 0.010)`        |
//! | Moonbag   | >= 6.0%     | `peak * (1 - 0.005)`        |
//!
//! Shorts mirror every rule around the entry/peak price.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Side;

/// Tolerance for threshold comparisons on computed returns.
const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopTier {
    Initial,
    Breakeven,
    Lock,
    Moonbag,
}

impl StopTier {
    pub fn as_str(self) -> &'static str {
        match self {
            StopTier::Initial => "initial",
            StopTier::Breakeven => "breakeven",
            StopTier::Lock => "lock",
            StopTier::Moonbag => "moonbag",
        }
    }
}

impl fmt::Display for StopTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier triggers and stop offsets. All values are fractions (0.015 = 1.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSchedule {
    pub breakeven_trigger: f64,
    pub lock_trigger: f64,
    pub moonbag_trigger: f64,
    /// Breakeven stop sits this far on the profitable side of entry.
    pub breakeven_offset: f64,
    /// Lock-tier trail distance from the peak price.
    pub lock_trail: f64,
    /// Moonbag-tier trail distance from the peak price.
    pub moonbag_trail: f64,
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self {
            breakeven_trigger: 0.015,
            lock_trigger: 0.03,
            moonbag_trigger: 0.06,
            breakeven_offset: 0.002,
            lock_trail: 0.010,
            moonbag_trail: 0.005,
        }
    }
}

impl TierSchedule {
    /// Tier selected by a peak return.
    pub fn tier_for(&self, peak_return: f64) -> StopTier {
        if peak_return + EPS >= self.moonbag_trigger {
            StopTier::Moonbag
        } else if peak_return + EPS >= self.lock_trigger {
            StopTier::Lock
        } else if peak_return + EPS >= self.breakeven_trigger {
            StopTier::Breakeven
        } else {
            StopTier::Initial
        }
    }

    /// Candidate stop for `tier`, before ratcheting.
    pub fn candidate(
        &self,
        tier: StopTier,
        side: Side,
        entry: f64,
        peak_price: f64,
        initial_width: f64,
    ) -> f64 {
        // (reference price, signed distance toward the adverse side)
        let (reference, offset) = match tier {
            StopTier::Initial => (entry, initial_width),
            StopTier::Breakeven => (entry, -self.breakeven_offset),
            StopTier::Lock => (peak_price, self.lock_trail),
            StopTier::Moonbag => (peak_price, self.moonbag_trail),
        };
        match side {
            Side::Long => reference * (1.0 - offset),
            Side::Short => reference * (1.0 + offset),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.breakeven_trigger > 0.0
            && self.breakeven_trigger < self.lock_trigger
            && self.lock_trigger < self.moonbag_trigger)
        {
            return Err("tier triggers must satisfy 0 < breakeven < lock < moonbag".into());
        }
        for (name, v) in [
            ("breakeven_offset", self.breakeven_offset),
            ("lock_trail", self.lock_trail),
            ("moonbag_trail", self.moonbag_trail),
        ] {
            if !(0.0..1.0).contains(&v) {
                return Err(format!("{name} must be in [0, 1), got {v}"));
            }
        }
        Ok(())
    }
}

/// Stop configuration shared by the live manager and the backtest simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Minimum Initial-tier distance from entry (0.035 = 3.5%).
    pub stop_floor: f64,
    /// Maximum Initial-tier distance from entry, however wide volatility suggests.
    pub stop_ceiling: f64,
    /// Exit fill penalty applied against the stop price.
    pub exit_slippage: f64,
    /// When set, the Initial width becomes `confirmation range * multiplier`,
    /// clamped to `[stop_floor, stop_ceiling]`.
    pub volatility_multiplier: Option<f64>,
    /// Live tick cadence.
    pub poll_interval_ms: u64,
    pub tiers: TierSchedule,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            stop_floor: 0.035,
            stop_ceiling: 0.05,
            exit_slippage: 0.001,
            volatility_multiplier: None,
            poll_interval_ms: 1000,
            tiers: TierSchedule::default(),
        }
    }
}

impl StopConfig {
    /// Initial-tier stop distance given the realized range seen during confirmation.
    pub fn initial_width(&self, range_pct: Option<f64>) -> f64 {
        let suggested = match (self.volatility_multiplier, range_pct) {
            (Some(mult), Some(range)) if range.is_finite() => range * mult,
            _ => self.stop_floor,
        };
        suggested.max(self.stop_floor).min(self.stop_ceiling)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.stop_floor > 0.0 && self.stop_floor < 1.0) {
            return Err(format!("stop_floor must be in (0, 1), got {}", self.stop_floor));
        }
        if !(self.stop_ceiling >= self.stop_floor && self.stop_ceiling < 1.0) {
            return Err(format!(
                "stop_ceiling must be in [stop_floor, 1), got {}",
                self.stop_ceiling
            ));
        }
        if !(0.0..0.5).contains(&self.exit_slippage) {
            return Err(format!("exit_slippage must be in [0, 0.5), got {}", self.exit_slippage));
        }
        if let Some(m) = self.volatility_multiplier {
            if !(m.is_finite() && m > 0.0) {
                return Err(format!("volatility_multiplier must be positive, got {m}"));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be > 0".into());
        }
        self.tiers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn tier_thresholds() {
        let s = TierSchedule::default();
        assert_eq!(s.tier_for(0.0), StopTier::Initial);
        assert_eq!(s.tier_for(0.0149), StopTier::Initial);
        assert_eq!(s.tier_for(0.015), StopTier::Breakeven);
        assert_eq!(s.tier_for(0.03), StopTier::Lock);
        assert_eq!(s.tier_for(0.0599), StopTier::Lock);
        assert_eq!(s.tier_for(0.06), StopTier::Moonbag);
        assert_eq!(s.tier_for(0.5), StopTier::Moonbag);
    }

    #[test]
    fn long_candidates() {
        let s = TierSchedule::default();
        assert!(approx(s.candidate(StopTier::Initial, Side::Long, 100.0, 100.0, 0.035), 96.5));
        assert!(approx(s.candidate(StopTier::Breakeven, Side::Long, 100.0, 101.5, 0.035), 100.2));
        assert!(approx(s.candidate(StopTier::Lock, Side::Long, 100.0, 103.0, 0.035), 101.97));
        assert!(approx(s.candidate(StopTier::Moonbag, Side::Long, 100.0, 110.0, 0.035), 109.45));
    }

    #[test]
    fn short_candidates_mirror() {
        let s = TierSchedule::default();
        assert!(approx(s.candidate(StopTier::Initial, Side::Short, 100.0, 100.0, 0.035), 103.5));
        assert!(approx(s.candidate(StopTier::Breakeven, Side::Short, 100.0, 98.5, 0.035), 99.8));
        assert!(approx(s.candidate(StopTier::Lock, Side::Short, 100.0, 97.0, 0.035), 97.97));
        assert!(approx(s.candidate(StopTier::Moonbag, Side::Short, 100.0, 90.0, 0.035), 90.45));
    }

    #[test]
    fn initial_width_floor_and_ceiling() {
        let mut cfg = StopConfig::default();
        assert!(approx(cfg.initial_width(Some(0.2)), 0.035)); // no multiplier configured
        cfg.volatility_multiplier = Some(2.0);
        assert!(approx(cfg.initial_width(Some(0.01)), 0.035)); // 2% < floor
        assert!(approx(cfg.initial_width(Some(0.02)), 0.04));
        assert!(approx(cfg.initial_width(Some(0.2)), 0.05)); // capped at ceiling
        assert!(approx(cfg.initial_width(None), 0.035));
    }

    #[test]
    fn validate_rejects_bad_schedule() {
        let mut s = TierSchedule::default();
        s.lock_trigger = 0.01;
        assert!(s.validate().is_err());

        let mut cfg = StopConfig::default();
        cfg.stop_ceiling = 0.01;
        assert!(cfg.validate().is_err());
        assert!(StopConfig::default().validate().is_ok());
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(StopTier::Initial < StopTier::Breakeven);
        assert!(StopTier::Lock < StopTier::Moonbag);
    }
}
