//! One signal, start to finish.
//!
//! confirm -> read balance -> size and enter -> alert -> manage stop -> record.
//! Each step strictly follows the previous one. Expiry and entry failures are
//! ordinary outcomes; only a safety violation is an error.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::confirm::{ConfirmationMonitor, ConfirmationResult};
use crate::domain::{Signal, SignalId, Trade};
use crate::gateway::{Gateway, GatewayError};
use crate::sinks::{AlertSink, EntryAlert, FailureAlert, TradeRecorder};
use crate::sizing::{EntryError, PositionSizer};
use crate::stops::TrailingStopManager;

#[derive(Debug, Error)]
pub enum EngineError {
    /// An order path broke the execution mode. Halts the engine.
    #[error("safety violation in lifecycle {signal_id}: {source}")]
    Safety {
        signal_id: SignalId,
        #[source]
        source: GatewayError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// The move never materialized; the signal is discarded.
    Expired(ConfirmationResult),
    /// Confirmed but no position was opened.
    Aborted { reason: String },
    Closed(Trade),
}

/// Shared, immutable wiring for every lifecycle.
pub struct Lifecycle {
    gateway: Arc<Gateway>,
    config: EngineConfig,
    monitor: ConfirmationMonitor,
    sizer: PositionSizer,
    stops: TrailingStopManager,
    recorder: Arc<dyn TradeRecorder>,
    alerts: Arc<dyn AlertSink>,
}

impl Lifecycle {
    pub fn new(
        gateway: Arc<Gateway>,
        config: EngineConfig,
        recorder: Arc<dyn TradeRecorder>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            monitor: ConfirmationMonitor::new(gateway.clone(), config.confirmation.poll_interval()),
            sizer: PositionSizer::new(gateway.clone(), config.sizing.clone()),
            stops: TrailingStopManager::new(gateway.clone(), config.stops.clone()),
            gateway,
            config,
            recorder,
            alerts,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub async fn run(&self, signal: Signal) -> Result<LifecycleOutcome, EngineError> {
        let signal_id = signal.id();
        let confirmation = self
            .monitor
            .await_confirmation(
                &signal,
                self.config.confirmation.window(),
                self.config.confirmation.threshold_pct,
            )
            .await;
        if !confirmation.is_confirmed() {
            return Ok(LifecycleOutcome::Expired(confirmation));
        }

        let quote_asset = &self.config.sizing.quote_asset;
        let Some(balance) = self.gateway.balance(quote_asset).await else {
            return Ok(self.abort(&signal, &signal_id, format!("{quote_asset} balance unavailable")));
        };

        let entry = match self.sizer.size_and_enter(&signal, balance).await {
            Ok(entry) => entry,
            Err(EntryError::Gateway(source)) if source.is_fatal() => {
                error!(error = %source, "safety violation at entry");
                return Err(EngineError::Safety { signal_id, source });
            }
            Err(e) => return Ok(self.abort(&signal, &signal_id, e.to_string())),
        };

        match self.gateway.position(&signal.symbol).await {
            Ok(Some(venue_pos)) => debug!(
                quantity = venue_pos.quantity,
                entry_price = venue_pos.entry_price,
                "venue position after entry"
            ),
            Ok(None) => debug!("venue reports no position after entry"),
            Err(e) => debug!(error = %e, "venue position lookup failed"),
        }

        let alert = EntryAlert {
            signal_id: signal_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.direction,
            price: entry.position.entry_price(),
            quantity: entry.position.quantity(),
            confidence: signal.confidence,
        };
        if let Err(e) = self.alerts.entry(&alert) {
            warn!(error = %e, "entry alert not delivered");
        }

        let closed = match self.stops.manage(entry.position, confirmation.range_pct()).await {
            Ok(closed) => closed,
            Err(source) => {
                error!(error = %source, "safety violation while closing");
                return Err(EngineError::Safety { signal_id, source });
            }
        };

        let trade = Trade::close(
            &closed.position,
            closed.exit_price(),
            closed.reason(),
            signal.confidence,
            closed.closed_at,
        );
        info!(
            pnl = trade.pnl,
            pnl_pct = trade.pnl_pct,
            exit_reason = %trade.exit_reason,
            "trade closed"
        );
        if let Err(e) = self.recorder.record(&trade) {
            warn!(error = %e, "trade not recorded");
        }
        Ok(LifecycleOutcome::Closed(trade))
    }

    fn abort(&self, signal: &Signal, signal_id: &SignalId, reason: String) -> LifecycleOutcome {
        warn!(reason = %reason, "lifecycle aborted");
        let alert = FailureAlert {
            signal_id: signal_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.direction,
            reason: reason.clone(),
        };
        if let Err(e) = self.alerts.failure(&alert) {
            warn!(error = %e, "failure alert not delivered");
        }
        LifecycleOutcome::Aborted { reason }
    }
}
