use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OrderId;

/// Position side (also the predicted direction of a signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// Order side that opens a position on this side.
    pub fn entry_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position on this side.
    pub fn exit_order(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// Signed fractional move from `from` to `to`, positive when favorable.
    pub fn directional_return(self, from: f64, to: f64) -> f64 {
        if from <= 0.0 {
            return 0.0;
        }
        match self {
            Side::Long => (to - from) / from,
            Side::Short => (from - to) / from,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// An open position.
///
/// Quantity is fixed at entry. Fields are private so nothing after
/// construction can rescale the position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    symbol: String,
    side: Side,
    quantity: f64,
    entry_price: f64,
    leverage: f64,
    opened_at: DateTime<Utc>,
    order_id: OrderId,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        quantity: f64,
        entry_price: f64,
        leverage: f64,
        opened_at: DateTime<Utc>,
        order_id: OrderId,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            leverage,
            opened_at,
            order_id,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.entry_price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => self.quantity * (price - self.entry_price),
            Side::Short => self.quantity * (self.entry_price - price),
        }
    }
}
