//! NewsEdge Core: turns news signals into risk-managed positions.
//!
//! - Domain types (signals, ticks, prices, positions, trades, ids)
//! - Venue seam and the execution-mode gateway (dry-run is structural)
//! - Confirmation gate and live monitor
//! - Position sizing and entry
//! - Four-tier trailing stop with ratchet invariant, pure and live
//! - Per-signal lifecycle and the supervising orchestrator
//! - Trade/alert sinks and TOML engine configuration
//!
//! The pure state machines (`ConfirmationGate`, `TrailingStop`) are the only
//! implementation of the confirmation and tiering rules; the backtest runner
//! drives them over recorded ticks.

pub mod config;
pub mod confirm;
pub mod domain;
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod sinks;
pub mod sizing;
pub mod stops;
