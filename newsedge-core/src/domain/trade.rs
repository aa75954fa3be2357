//! Trade: the terminal record of a closed position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Position, Side};
use crate::stops::StopTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Closed,
}

/// Why a position closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExitReason {
    /// Price crossed the trailing stop.
    Stop { tier: StopTier, peak_return: f64 },
    /// A bounded simulation ran out of ticks.
    Time { peak_return: f64 },
}

impl ExitReason {
    pub fn peak_return(&self) -> f64 {
        match self {
            ExitReason::Stop { peak_return, .. } | ExitReason::Time { peak_return } => *peak_return,
        }
    }

    pub fn tier(&self) -> Option<StopTier> {
        match self {
            ExitReason::Stop { tier, .. } => Some(*tier),
            ExitReason::Time { .. } => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Stop { tier, peak_return } => {
                write!(f, "stop:{tier} (peak {:.2}%)", peak_return * 100.0)
            }
            ExitReason::Time { peak_return } => {
                write!(f, "time (peak {:.2}%)", peak_return * 100.0)
            }
        }
    }
}

/// Immutable round-trip record handed to the trade recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Close time.
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub confidence: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub status: TradeStatus,
    pub exit_reason: ExitReason,
    pub duration_secs: i64,
}

impl Trade {
    /// Close `position` at `exit_price`.
    pub fn close(
        position: &Position,
        exit_price: f64,
        exit_reason: ExitReason,
        confidence: f64,
        closed_at: DateTime<Utc>,
    ) -> Self {
        let pnl = position.unrealized_pnl(exit_price);
        let notional = position.notional();
        let pnl_pct = if notional > 0.0 { pnl / notional } else { 0.0 };
        Self {
            timestamp: closed_at,
            symbol: position.symbol().to_string(),
            side: position.side(),
            entry_price: position.entry_price(),
            exit_price,
            quantity: position.quantity(),
            confidence,
            pnl,
            pnl_pct,
            status: TradeStatus::Closed,
            exit_reason,
            duration_secs: (closed_at - position.opened_at()).num_seconds(),
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
