//! Tick: one second of price action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::price::Price;

/// OHLC summary of one sampling interval.
///
/// Live quotes are point prices and become flat ticks (`open == high == low == close`).
/// Recorded arrays carry the full range, which the stop logic uses for its
/// favorable/adverse extremes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Tick {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// A flat tick from a single live quote.
    pub fn from_quote(timestamp: DateTime<Utc>, price: Price) -> Self {
        let p = price.get();
        Self::new(timestamp, p, p, p, p)
    }

    /// Range over open; the volatility measure used by hindsight alignment.
    pub fn range_pct(&self) -> f64 {
        if self.open <= 0.0 {
            return 0.0;
        }
        (self.high - self.low) / self.open
    }

    /// high >= low, high/low bracket open and close, all prices positive and finite.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.low > 0.0
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tick {
        Tick::new(Utc::now(), 100.0, 102.0, 99.0, 101.0)
    }

    #[test]
    fn sane_tick() {
        assert!(sample().is_sane());
    }

    #[test]
    fn insane_high_low() {
        let mut t = sample();
        t.high = 98.0;
        assert!(!t.is_sane());
    }

    #[test]
    fn nan_is_insane() {
        let mut t = sample();
        t.close = f64::NAN;
        assert!(!t.is_sane());
    }

    #[test]
    fn range_pct() {
        assert!((sample().range_pct() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn quote_is_flat() {
        let t = Tick::from_quote(Utc::now(), Price::new(20.0).unwrap());
        assert_eq!(t.high, t.low);
        assert_eq!(t.range_pct(), 0.0);
    }
}
