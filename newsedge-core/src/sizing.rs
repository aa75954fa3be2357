//! Position sizing and entry.
//!
//! Notional is `balance * risk_pct * leverage * impact_multiplier`, capped at
//! `balance * max_alloc_pct` regardless of leverage or impact. Quantity is the
//! capped notional over the price read just before the order goes out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{OrderId, Position, Price, Signal};
use crate::gateway::{Gateway, GatewayError, OrderAck, OrderRequest, OrderStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of balance risked per signal before leverage.
    pub risk_pct: f64,
    pub leverage: f64,
    /// Hard ceiling on notional as a fraction of balance.
    pub max_alloc_pct: f64,
    /// Balance asset.
    pub quote_asset: String,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_pct: 0.10,
            leverage: 3.0,
            max_alloc_pct: 0.20,
            quote_asset: "USDT".to_string(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.risk_pct > 0.0 && self.risk_pct <= 1.0) {
            return Err(format!("risk_pct must be in (0, 1], got {}", self.risk_pct));
        }
        if !(self.leverage.is_finite() && self.leverage >= 1.0) {
            return Err(format!("leverage must be >= 1, got {}", self.leverage));
        }
        if !(self.max_alloc_pct > 0.0 && self.max_alloc_pct <= 1.0) {
            return Err(format!("max_alloc_pct must be in (0, 1], got {}", self.max_alloc_pct));
        }
        if self.quote_asset.trim().is_empty() {
            return Err("quote_asset must not be empty".into());
        }
        Ok(())
    }
}

/// Position-size scaling from a signal's impact score.
pub fn impact_multiplier(impact: u8) -> f64 {
    if impact >= 8 {
        2.0
    } else if impact >= 5 {
        1.5
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPlan {
    pub balance: f64,
    pub price: f64,
    pub multiplier: f64,
    pub raw_notional: f64,
    pub notional: f64,
    pub quantity: f64,
    /// True when the allocation ceiling bound the notional.
    pub capped: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("insufficient funds: balance {0}")]
    InsufficientFunds(f64),
    #[error("computed quantity {0} is not tradable")]
    InvalidQuantity(f64),
}

pub fn plan_position(
    balance: f64,
    impact: u8,
    price: Price,
    config: &SizingConfig,
) -> Result<SizingPlan, SizingError> {
    if !(balance.is_finite() && balance > 0.0) {
        return Err(SizingError::InsufficientFunds(balance));
    }
    let multiplier = impact_multiplier(impact);
    let raw_notional = balance * config.risk_pct * config.leverage * multiplier;
    let ceiling = balance * config.max_alloc_pct;
    let notional = raw_notional.min(ceiling);
    let quantity = notional / price.get();
    if !(quantity.is_finite() && quantity > 0.0) {
        return Err(SizingError::InvalidQuantity(quantity));
    }
    Ok(SizingPlan {
        balance,
        price: price.get(),
        multiplier,
        raw_notional,
        notional,
        quantity,
        capped: raw_notional > ceiling,
    })
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    #[error(transparent)]
    Sizing(#[from] SizingError),
    #[error("no price for {0} at entry")]
    NoPrice(String),
    #[error("entry order {id} not filled: {status:?}")]
    NotFilled { id: OrderId, status: OrderStatus },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl EntryError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EntryError::Gateway(e) if e.is_fatal())
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub position: Position,
    pub plan: SizingPlan,
    pub ack: OrderAck,
}

pub struct PositionSizer {
    gateway: Arc<Gateway>,
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(gateway: Arc<Gateway>, config: SizingConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Size the signal against `balance` and place a market order.
    ///
    /// A non-positive balance fails before any gateway call. Anything other
    /// than a `Filled` acknowledgement aborts with `NotFilled`.
    pub async fn size_and_enter(&self, signal: &Signal, balance: f64) -> Result<Entry, EntryError> {
        if !(balance.is_finite() && balance > 0.0) {
            return Err(SizingError::InsufficientFunds(balance).into());
        }
        let price = self
            .gateway
            .price(&signal.symbol)
            .await
            .ok_or_else(|| EntryError::NoPrice(signal.symbol.clone()))?;
        let plan = plan_position(balance, signal.impact, price, &self.config)?;

        let order = OrderRequest::market(
            signal.symbol.clone(),
            signal.direction.entry_order(),
            plan.quantity,
        );
        let ack = self.gateway.place_order(&order).await?;
        if !ack.is_filled() {
            warn!(symbol = %signal.symbol, order_id = %ack.id, status = ?ack.status, "entry not filled");
            return Err(EntryError::NotFilled {
                id: ack.id,
                status: ack.status,
            });
        }

        let entry_price = ack.fill_price.filter(|p| *p > 0.0).unwrap_or(plan.price);
        info!(
            symbol = %signal.symbol,
            side = signal.direction.as_str(),
            quantity = plan.quantity,
            entry_price,
            notional = plan.notional,
            capped = plan.capped,
            "position opened"
        );
        let position = Position::open(
            signal.symbol.clone(),
            signal.direction,
            plan.quantity,
            entry_price,
            self.config.leverage,
            Utc::now(),
            ack.id.clone(),
        );
        Ok(Entry {
            position,
            plan,
            ack,
        })
    }
}
