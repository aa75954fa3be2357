//! Live trailing stop loop.
//!
//! One manager owns one position from fill to close. Each poll reads a quote,
//! feeds it to the position's `TrailingStop`, and on a breach sends the
//! closing order. There is no timeout: the loop ends on a filled close or a
//! fatal gateway error.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::tiers::StopConfig;
use super::trailing::{StopDecision, StopExit, TrailingStop};
use crate::domain::{ExitReason, OrderId, Position, Tick};
use crate::gateway::{Gateway, GatewayError};

/// A position after its closing order filled.
#[derive(Debug, Clone)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit: StopExit,
    pub close_order: OrderId,
    pub closed_at: DateTime<Utc>,
    /// Quote polls that produced a stop evaluation.
    pub ticks: usize,
}

impl ClosedPosition {
    pub fn exit_price(&self) -> f64 {
        self.exit.exit_price
    }

    pub fn reason(&self) -> ExitReason {
        self.exit.reason()
    }
}

pub struct TrailingStopManager {
    gateway: Arc<Gateway>,
    config: StopConfig,
}

impl TrailingStopManager {
    pub fn new(gateway: Arc<Gateway>, config: StopConfig) -> Self {
        Self { gateway, config }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Manage `position` until its stop is hit and the close fills.
    ///
    /// Ownership of the position moves into the manager, so a position can
    /// only be under one manager at a time. A missing quote skips the tick. A
    /// failed or unfilled close is retried on the next tick with the stop
    /// state untouched.
    pub async fn manage(
        &self,
        position: Position,
        range_pct: Option<f64>,
    ) -> Result<ClosedPosition, GatewayError> {
        let mut stop = TrailingStop::new(
            position.side(),
            position.entry_price(),
            &self.config,
            range_pct,
        );
        info!(
            symbol = position.symbol(),
            side = position.side().as_str(),
            entry = position.entry_price(),
            stop = stop.state().stop_price,
            width = stop.initial_width(),
            "stop management started"
        );

        let mut ticker = interval(self.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tier = stop.state().tier;

        loop {
            ticker.tick().await;
            let Some(price) = self.gateway.price(position.symbol()).await else {
                debug!(symbol = position.symbol(), "stop tick skipped: no price");
                continue;
            };

            let exit = match stop.on_tick(&Tick::from_quote(Utc::now(), price)) {
                StopDecision::Hold(state) => {
                    if state.tier != last_tier {
                        info!(
                            symbol = position.symbol(),
                            tier = %state.tier,
                            stop = state.stop_price,
                            peak_return = state.peak_return,
                            "stop tier upgraded"
                        );
                        last_tier = state.tier;
                    }
                    continue;
                }
                StopDecision::Exit(exit) => exit,
            };

            match self.gateway.close_position(&position).await {
                Ok(ack) if ack.is_filled() => {
                    info!(
                        symbol = position.symbol(),
                        tier = %exit.tier,
                        stop = exit.stop_price,
                        exit_price = exit.exit_price,
                        peak_return = exit.peak_return,
                        "position closed"
                    );
                    return Ok(ClosedPosition {
                        position,
                        exit,
                        close_order: ack.id,
                        closed_at: Utc::now(),
                        ticks: stop.ticks(),
                    });
                }
                Ok(ack) => {
                    warn!(
                        symbol = position.symbol(),
                        order_id = %ack.id,
                        status = ?ack.status,
                        "close not filled; retrying next tick"
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(symbol = position.symbol(), error = %e, "close failed; retrying next tick");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::gateway::{ExecutionMode, PaperVenue};
    use crate::stops::StopTier;

    fn open(side: Side, entry: f64) -> Position {
        Position::open("SOLUSDT", side, 5.0, entry, 3.0, Utc::now(), OrderId::from(1))
    }

    #[tokio::test(start_paused = true)]
    async fn initial_stop_hit_closes_with_slippage() {
        let venue = Arc::new(PaperVenue::new("paper"));
        venue.script_prices("SOLUSDT", [Some(100.0), None, Some(98.0), Some(96.4)]);
        let gw = Arc::new(Gateway::connect(venue.clone(), ExecutionMode::Testnet).unwrap());
        let mgr = TrailingStopManager::new(gw, StopConfig::default());

        let closed = mgr.manage(open(Side::Long, 100.0), None).await.unwrap();
        assert_eq!(closed.exit.tier, StopTier::Initial);
        assert!((closed.exit.stop_price - 96.5).abs() < 1e-9);
        assert!((closed.exit_price() - 96.5 * 0.999).abs() < 1e-9);
        // the None read was skipped, not evaluated
        assert_eq!(closed.ticks, 3);
        let orders = venue.submitted_orders();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].reduce_only);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_close_retries_next_tick() {
        let venue = Arc::new(PaperVenue::new("paper"));
        venue.script_prices("SOLUSDT", [Some(103.0), Some(104.0)]);
        venue.reject_orders(true);
        let gw = Arc::new(Gateway::connect(venue.clone(), ExecutionMode::Testnet).unwrap());
        let mgr = Arc::new(TrailingStopManager::new(gw, StopConfig::default()));

        let task = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.manage(open(Side::Short, 100.0), None).await })
        };
        // t=0 holds at 103, t=1 breaches at 104 and the close is rejected
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(venue.submitted_orders().len(), 1);
        assert!(!task.is_finished());
        venue.reject_orders(false);

        let closed = task.await.unwrap().unwrap();
        assert_eq!(closed.exit.tier, StopTier::Initial);
        assert!((closed.exit.stop_price - 103.5).abs() < 1e-9);
        assert!((closed.exit_price() - 103.5 * 1.001).abs() < 1e-9);
        assert_eq!(venue.submitted_orders().len(), 2);
    }
}
