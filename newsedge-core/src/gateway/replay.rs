//! Replay venue: recorded one-second ticks served as a live feed.
//!
//! The tick served for a symbol is `ticks[elapsed_secs]`, measured from the
//! moment the venue was constructed. Past the end of a recording the venue
//! reports no data. Orders fill at the current tick's close.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use super::venue::{
    MarketData, OrderAck, OrderEntry, OrderRequest, OrderStatus, VenueError, VenuePosition,
};
use crate::domain::{OrderId, OrderSide, Price, Side, Tick};

#[derive(Default)]
struct ReplayBook {
    positions: HashMap<String, VenuePosition>,
    next_id: u64,
}

pub struct ReplayVenue {
    feeds: HashMap<String, Vec<Tick>>,
    balances: HashMap<String, f64>,
    started: Instant,
    book: Mutex<ReplayBook>,
}

impl ReplayVenue {
    pub fn new(feeds: HashMap<String, Vec<Tick>>) -> Self {
        Self {
            feeds,
            balances: HashMap::new(),
            started: Instant::now(),
            book: Mutex::new(ReplayBook::default()),
        }
    }

    pub fn with_balance(mut self, asset: impl Into<String>, amount: f64) -> Self {
        self.balances.insert(asset.into(), amount);
        self
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    fn book(&self) -> MutexGuard<'_, ReplayBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_tick(&self, symbol: &str) -> Result<&Tick, VenueError> {
        let feed = self
            .feeds
            .get(symbol)
            .ok_or_else(|| VenueError::NoData(symbol.to_string()))?;
        let idx = self.started.elapsed().as_secs() as usize;
        feed.get(idx)
            .ok_or_else(|| VenueError::NoData(format!("{symbol} (recording exhausted)")))
    }

    fn fill(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        let price = self.current_tick(&order.symbol)?.close;
        let mut book = self.book();
        book.next_id += 1;
        let id = OrderId::new(format!("replay-{}", book.next_id));
        if order.reduce_only {
            book.positions.remove(&order.symbol);
        } else {
            let side = match order.side {
                OrderSide::Buy => Side::Long,
                OrderSide::Sell => Side::Short,
            };
            book.positions.insert(
                order.symbol.clone(),
                VenuePosition {
                    symbol: order.symbol.clone(),
                    side,
                    quantity: order.quantity,
                    entry_price: price,
                },
            );
        }
        Ok(OrderAck {
            id,
            status: OrderStatus::Filled,
            fill_price: Some(price),
            filled_quantity: order.quantity,
        })
    }
}

#[async_trait]
impl MarketData for ReplayVenue {
    fn name(&self) -> &str {
        "replay"
    }

    async fn price(&self, symbol: &str) -> Result<Price, VenueError> {
        let tick = self.current_tick(symbol)?;
        Price::new(tick.close).ok_or_else(|| VenueError::NoData(symbol.to_string()))
    }

    async fn balance(&self, asset: &str) -> Result<f64, VenueError> {
        self.balances
            .get(asset)
            .copied()
            .ok_or_else(|| VenueError::NoData(asset.to_string()))
    }

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError> {
        Ok(self.book().positions.get(symbol).cloned())
    }
}

#[async_trait]
impl OrderEntry for ReplayVenue {
    fn is_testnet(&self) -> bool {
        true
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.fill(order)
    }

    async fn close_position(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, VenueError> {
        self.fill(&OrderRequest::close(symbol, side, quantity))
    }
}
