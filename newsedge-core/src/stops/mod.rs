//! Trailing stop management.
//!
//! - `tiers`: the four-tier stop schedule and stop configuration
//! - `ratchet`: stops may tighten, never loosen
//! - `trailing`: the per-position state machine, pure and tick-driven
//! - `manager`: the live loop that feeds gateway quotes into the state machine
//!
//! The backtest simulator drives `TrailingStop` directly over recorded ticks, so
//! live and simulated positions share one implementation of the tiering rules.

pub mod manager;
pub mod ratchet;
pub mod tiers;
pub mod trailing;

pub use manager::{ClosedPosition, TrailingStopManager};
pub use ratchet::RatchetState;
pub use tiers::{StopConfig, StopTier, TierSchedule};
pub use trailing::{StopDecision, StopExit, StopState, TrailingStop};
