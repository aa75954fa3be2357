//! Gateway: the engine's only path to a venue.
//!
//! The gateway normalizes venue reads (`Option` instead of errors for
//! transient gaps) and owns the order route. The route is chosen at
//! construction:
//!
//! - `DryRun`: a paper route that fills synthetically at the current quote.
//!   The gateway holds no `OrderEntry` handle, so nothing can be transmitted.
//! - `Testnet`: orders go to the venue, which must report itself as a testnet.
//! - `Live`: orders go to the venue.

pub mod paper;
pub mod replay;
pub mod venue;

pub use paper::PaperVenue;
pub use replay::ReplayVenue;
pub use venue::{
    MarketData, OrderAck, OrderEntry, OrderRequest, OrderStatus, OrderType, Venue, VenueError,
    VenuePosition,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{OrderId, Position, Price};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    DryRun,
    Testnet,
    Live,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::DryRun => "dry_run",
            ExecutionMode::Testnet => "testnet",
            ExecutionMode::Live => "live",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// An order path that would break the configured execution mode. Fatal.
    #[error("safety violation: {0}")]
    SafetyViolation(String),
    #[error("no price available for {0}")]
    NoPrice(String),
    #[error(transparent)]
    Venue(#[from] VenueError),
}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::SafetyViolation(_))
    }
}

enum OrderRoute {
    Paper { next_id: AtomicU64 },
    Venue(Arc<dyn OrderEntry>),
}

pub struct Gateway {
    data: Arc<dyn MarketData>,
    route: OrderRoute,
    mode: ExecutionMode,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("venue", &self.data.name())
            .field("mode", &self.mode)
            .finish()
    }
}

impl Gateway {
    /// Read-only gateway; every order is filled on the paper route.
    pub fn dry_run(data: Arc<dyn MarketData>) -> Self {
        Self {
            data,
            route: OrderRoute::Paper {
                next_id: AtomicU64::new(1),
            },
            mode: ExecutionMode::DryRun,
        }
    }

    /// Build a gateway for `mode`.
    ///
    /// In `DryRun` the venue's order side is dropped here and never stored.
    /// `Testnet` refuses a venue that is not a testnet.
    pub fn connect<V>(venue: Arc<V>, mode: ExecutionMode) -> Result<Self, GatewayError>
    where
        V: Venue + 'static,
    {
        match mode {
            ExecutionMode::DryRun => Ok(Self::dry_run(venue)),
            ExecutionMode::Testnet if !venue.is_testnet() => {
                Err(GatewayError::SafetyViolation(format!(
                    "testnet mode requested but venue '{}' is not a testnet",
                    venue.name()
                )))
            }
            ExecutionMode::Testnet | ExecutionMode::Live => {
                let data: Arc<dyn MarketData> = venue.clone();
                let entry: Arc<dyn OrderEntry> = venue;
                Ok(Self {
                    data,
                    route: OrderRoute::Venue(entry),
                    mode,
                })
            }
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn venue_name(&self) -> &str {
        self.data.name()
    }

    /// Current quote, or `None` when the venue has no usable price.
    pub async fn price(&self, symbol: &str) -> Option<Price> {
        match self.data.price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                debug!(symbol, error = %e, "price read failed");
                None
            }
        }
    }

    /// Available balance, or `None` when the read failed.
    pub async fn balance(&self, asset: &str) -> Option<f64> {
        match self.data.balance(asset).await {
            Ok(b) if b.is_finite() => Some(b),
            Ok(b) => {
                debug!(asset, balance = b, "non-finite balance ignored");
                None
            }
            Err(e) => {
                debug!(asset, error = %e, "balance read failed");
                None
            }
        }
    }

    pub async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, GatewayError> {
        Ok(self.data.position(symbol).await?)
    }

    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        match &self.route {
            OrderRoute::Paper { next_id } => {
                let price = self
                    .price(&order.symbol)
                    .await
                    .ok_or_else(|| GatewayError::NoPrice(order.symbol.clone()))?;
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                info!(
                    symbol = %order.symbol,
                    side = ?order.side,
                    quantity = order.quantity,
                    price = price.get(),
                    reduce_only = order.reduce_only,
                    "dry-run order filled on paper route"
                );
                Ok(OrderAck {
                    id: OrderId::new(format!("dry-{id}")),
                    status: OrderStatus::Filled,
                    fill_price: Some(price.get()),
                    filled_quantity: order.quantity,
                })
            }
            OrderRoute::Venue(entry) => {
                if self.mode == ExecutionMode::Testnet && !entry.is_testnet() {
                    return Err(GatewayError::SafetyViolation(
                        "testnet gateway routed to a non-testnet venue".into(),
                    ));
                }
                Ok(entry.submit_order(order).await?)
            }
        }
    }

    pub async fn close_position(&self, position: &Position) -> Result<OrderAck, GatewayError> {
        match &self.route {
            OrderRoute::Paper { .. } => {
                let order = OrderRequest::close(
                    position.symbol(),
                    position.side(),
                    position.quantity(),
                );
                self.place_order(&order).await
            }
            OrderRoute::Venue(entry) => {
                if self.mode == ExecutionMode::Testnet && !entry.is_testnet() {
                    return Err(GatewayError::SafetyViolation(
                        "testnet gateway routed to a non-testnet venue".into(),
                    ));
                }
                Ok(entry
                    .close_position(position.symbol(), position.side(), position.quantity())
                    .await?)
            }
        }
    }
}
