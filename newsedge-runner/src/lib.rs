//! NewsEdge Runner: backtest simulation over recorded events.
//!
//! This crate builds on `newsedge-core` to provide:
//! - Tick CSV and events-manifest loading
//! - Hindsight alignment (anchor at peak realized volatility)
//! - Deterministic RNG hierarchy for seeded runs
//! - Per-event simulation reusing the live confirmation and stop state machines
//! - Monte Carlo perturbation sweeps (rayon) with mean/variance summaries
//! - CSV/JSON report export

pub mod alignment;
pub mod config;
pub mod monte_carlo;
pub mod report;
pub mod rng;
pub mod simulator;
pub mod ticks;

pub use alignment::{find_event_anchor, Anchor, AnchorMethod};
pub use config::{BacktestConfig, ConfigError};
pub use monte_carlo::{summarize, sweep_event, sweep_events, EventSweep, PerturbationConfig, SweepSummary};
pub use report::{export_reports_csv, export_summary_json, save_reports};
pub use rng::RngHierarchy;
pub use simulator::{EventReport, SimError, SimMode, SimParams, SimulationConfig, Simulator};
pub use ticks::{load_events, load_ticks, read_ticks, Event, LoadError};
