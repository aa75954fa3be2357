//! Venue contract.
//!
//! Reads and writes are separate traits. A `Gateway` in dry-run mode is built
//! from a `MarketData` handle only, so no order can reach a venue from it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{OrderId, OrderSide, Price, Side};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    /// Transient: the venue had nothing to report.
    #[error("no data for {0}")]
    NoData(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by venue: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Closing orders may only reduce an existing position.
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            reduce_only: false,
        }
    }

    pub fn close(symbol: impl Into<String>, position_side: Side, quantity: f64) -> Self {
        Self {
            reduce_only: true,
            ..Self::market(symbol, position_side.exit_order(), quantity)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub id: OrderId,
    pub status: OrderStatus,
    pub fill_price: Option<f64>,
    pub filled_quantity: f64,
}

impl OrderAck {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// A position as the venue reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
}

/// Read side of a venue.
#[async_trait]
pub trait MarketData: Send + Sync {
    fn name(&self) -> &str;

    async fn price(&self, symbol: &str) -> Result<Price, VenueError>;

    async fn balance(&self, asset: &str) -> Result<f64, VenueError>;

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError>;
}

/// Write side of a venue.
#[async_trait]
pub trait OrderEntry: Send + Sync {
    /// True when the venue endpoint is a testnet/sandbox.
    fn is_testnet(&self) -> bool;

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError>;

    async fn close_position(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, VenueError>;
}

/// One implementing type per venue.
pub trait Venue: MarketData + OrderEntry {}

impl<T: MarketData + OrderEntry> Venue for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_request_is_reduce_only_and_opposite() {
        let req = OrderRequest::close("BTCUSDT", Side::Long, 0.5);
        assert!(req.reduce_only);
        assert_eq!(req.side, OrderSide::Sell);
        assert_eq!(req.order_type, OrderType::Market);

        let req = OrderRequest::close("BTCUSDT", Side::Short, 0.5);
        assert_eq!(req.side, OrderSide::Buy);
    }

    #[test]
    fn only_filled_counts() {
        let mut ack = OrderAck {
            id: OrderId::from(1),
            status: OrderStatus::PartiallyFilled,
            fill_price: Some(10.0),
            filled_quantity: 1.0,
        };
        assert!(!ack.is_filled());
        ack.status = OrderStatus::Filled;
        assert!(ack.is_filled());
    }
}
