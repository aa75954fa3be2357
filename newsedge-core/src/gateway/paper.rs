//! In-memory paper venue.
//!
//! Prices are either set directly or scripted per symbol: each `price()` call
//! consumes the next scripted entry, then the last good price is held. A
//! scripted `None` or non-positive value reads as "no data". Orders fill at
//! the last good price and are journaled.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::venue::{
    MarketData, OrderAck, OrderEntry, OrderRequest, OrderStatus, VenueError, VenuePosition,
};
use crate::domain::{OrderId, OrderSide, Price, Side};

#[derive(Default)]
struct PaperState {
    scripts: HashMap<String, VecDeque<Option<f64>>>,
    last: HashMap<String, f64>,
    balances: HashMap<String, f64>,
    positions: HashMap<String, VenuePosition>,
    journal: Vec<OrderRequest>,
    next_id: u64,
    reject_orders: bool,
}

pub struct PaperVenue {
    name: String,
    testnet: bool,
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            testnet: true,
            state: Mutex::new(PaperState::default()),
        }
    }

    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut st = self.state();
        st.scripts.remove(symbol);
        st.last.insert(symbol.to_string(), price);
    }

    /// Queue prices returned by successive reads of `symbol`.
    pub fn script_prices<I>(&self, symbol: &str, prices: I)
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        self.state()
            .scripts
            .entry(symbol.to_string())
            .or_default()
            .extend(prices);
    }

    pub fn set_balance(&self, asset: &str, amount: f64) {
        self.state().balances.insert(asset.to_string(), amount);
    }

    /// Make every subsequent order come back `Rejected`.
    pub fn reject_orders(&self, reject: bool) {
        self.state().reject_orders = reject;
    }

    /// Orders that reached this venue.
    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state().journal.clone()
    }

    /// Price reads still queued for `symbol`.
    pub fn pending_script(&self, symbol: &str) -> usize {
        self.state().scripts.get(symbol).map_or(0, VecDeque::len)
    }

    fn fill(&self, order: OrderRequest) -> Result<OrderAck, VenueError> {
        let mut st = self.state();
        st.next_id += 1;
        let id = OrderId::new(format!("paper-{}", st.next_id));
        if st.reject_orders {
            st.journal.push(order);
            return Ok(OrderAck {
                id,
                status: OrderStatus::Rejected,
                fill_price: None,
                filled_quantity: 0.0,
            });
        }
        let price = *st
            .last
            .get(&order.symbol)
            .ok_or_else(|| VenueError::NoData(order.symbol.clone()))?;

        if order.reduce_only {
            st.positions.remove(&order.symbol);
        } else {
            let side = match order.side {
                OrderSide::Buy => Side::Long,
                OrderSide::Sell => Side::Short,
            };
            st.positions.insert(
                order.symbol.clone(),
                VenuePosition {
                    symbol: order.symbol.clone(),
                    side,
                    quantity: order.quantity,
                    entry_price: price,
                },
            );
        }
        let quantity = order.quantity;
        st.journal.push(order);
        Ok(OrderAck {
            id,
            status: OrderStatus::Filled,
            fill_price: Some(price),
            filled_quantity: quantity,
        })
    }
}

#[async_trait]
impl MarketData for PaperVenue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn price(&self, symbol: &str) -> Result<Price, VenueError> {
        let mut st = self.state();
        let scripted = st.scripts.get_mut(symbol).and_then(VecDeque::pop_front);
        let raw = match scripted {
            Some(Some(p)) => {
                if Price::new(p).is_some() {
                    st.last.insert(symbol.to_string(), p);
                }
                Some(p)
            }
            Some(None) => None,
            None => st.last.get(symbol).copied(),
        };
        raw.and_then(Price::new)
            .ok_or_else(|| VenueError::NoData(symbol.to_string()))
    }

    async fn balance(&self, asset: &str) -> Result<f64, VenueError> {
        self.state()
            .balances
            .get(asset)
            .copied()
            .ok_or_else(|| VenueError::NoData(asset.to_string()))
    }

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError> {
        Ok(self.state().positions.get(symbol).cloned())
    }
}

#[async_trait]
impl OrderEntry for PaperVenue {
    fn is_testnet(&self) -> bool {
        self.testnet
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.fill(order.clone())
    }

    async fn close_position(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, VenueError> {
        self.fill(OrderRequest::close(symbol, side, quantity))
    }
}
