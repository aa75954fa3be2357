//! Domain types for newsedge.

pub mod ids;
pub mod position;
pub mod price;
pub mod signal;
pub mod tick;
pub mod trade;

pub use ids::{OrderId, SignalId};
pub use position::{OrderSide, Position, Side};
pub use price::Price;
pub use signal::{Signal, SignalError};
pub use tick::Tick;
pub use trade::{ExitReason, Trade, TradeStatus};

/// Symbol type alias
pub type Symbol = String;
