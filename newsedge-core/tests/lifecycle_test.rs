//! Lifecycle and orchestrator tests on paused tokio time.
//!
//! Every test scripts a `PaperVenue`, so time-driven loops (confirmation
//! sampling, stop ticks) advance deterministically.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use newsedge_core::config::EngineConfig;
use newsedge_core::confirm::ConfirmationResult;
use newsedge_core::domain::{ExitReason, Price, Side, Signal};
use newsedge_core::gateway::{
    ExecutionMode, Gateway, MarketData, OrderAck, OrderEntry, OrderRequest, PaperVenue, VenueError,
    VenuePosition,
};
use newsedge_core::lifecycle::{EngineError, Lifecycle, LifecycleOutcome};
use newsedge_core::orchestrator::{Orchestrator, Submission};
use newsedge_core::sinks::{MemoryAlerts, MemoryTradeLog};
use newsedge_core::stops::StopTier;

const SYMBOL: &str = "ETHUSDT";

fn config(window_secs: u64) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.confirmation.window_secs = window_secs;
    cfg
}

struct Harness {
    venue: Arc<PaperVenue>,
    trades: Arc<MemoryTradeLog>,
    alerts: Arc<MemoryAlerts>,
    lifecycle: Lifecycle,
}

fn harness(mode: ExecutionMode, testnet: bool, cfg: EngineConfig) -> Harness {
    let venue = Arc::new(PaperVenue::new("paper").with_testnet(testnet));
    venue.set_balance("USDT", 10_000.0);
    let gateway = Arc::new(Gateway::connect(venue.clone(), mode).unwrap());
    let trades = Arc::new(MemoryTradeLog::new());
    let alerts = Arc::new(MemoryAlerts::new());
    let lifecycle = Lifecycle::new(gateway, cfg, trades.clone(), alerts.clone());
    Harness {
        venue,
        trades,
        alerts,
        lifecycle,
    }
}

#[tokio::test(start_paused = true)]
async fn flat_market_expires_without_orders() {
    let h = harness(ExecutionMode::Testnet, true, config(5));
    h.venue.set_price(SYMBOL, 100.0);

    let outcome = h
        .lifecycle
        .run(Signal::new(SYMBOL, Side::Long, 0.9, 9))
        .await
        .unwrap();
    match outcome {
        LifecycleOutcome::Expired(ConfirmationResult::Expired {
            start_price,
            ticks_sampled,
            ..
        }) => {
            assert_eq!(start_price, Some(100.0));
            assert_eq!(ticks_sampled, 5);
        }
        other => panic!("expected expiry, got {other:?}"),
    }
    assert!(h.venue.submitted_orders().is_empty());
    assert!(h.trades.trades().is_empty());
    assert!(h.alerts.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_start_price_expires_immediately() {
    let h = harness(ExecutionMode::Testnet, true, config(60));
    h.venue.script_prices(SYMBOL, [None]);

    let outcome = h
        .lifecycle
        .run(Signal::new(SYMBOL, Side::Short, 0.9, 3))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        LifecycleOutcome::Expired(ConfirmationResult::Expired {
            start_price: None,
            ticks_sampled: 0,
            best_move: 0.0,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn dry_run_round_trip_never_reaches_venue() {
    // mainnet venue: only the dry-run route makes this safe
    let h = harness(ExecutionMode::DryRun, false, config(10));
    h.venue.script_prices(
        SYMBOL,
        [
            Some(100.0), // start
            Some(100.0), // t0
            Some(100.3), // t1 confirms (+0.30%)
            Some(100.3), // sizing quote
            Some(100.3), // paper fill
            Some(101.0),
            Some(102.0), // peak +1.69% -> breakeven
            Some(100.1), // breach
        ],
    );

    let outcome = h
        .lifecycle
        .run(Signal::new(SYMBOL, Side::Long, 0.75, 6))
        .await
        .unwrap();
    let trade = match outcome {
        LifecycleOutcome::Closed(trade) => trade,
        other => panic!("expected a closed trade, got {other:?}"),
    };

    let stop = 100.3 * 1.002;
    assert_eq!(trade.entry_price, 100.3);
    assert!((trade.exit_price - stop * 0.999).abs() < 1e-9);
    assert_eq!(trade.exit_reason.tier(), Some(StopTier::Breakeven));
    assert!(matches!(trade.exit_reason, ExitReason::Stop { .. }));
    assert_eq!(trade.confidence, 0.75);
    // 10_000 * 0.10 * 3 * 1.5 = 4_500, capped at 2_000
    assert!((trade.quantity - 2_000.0 / 100.3).abs() < 1e-9);

    assert!(h.venue.submitted_orders().is_empty());
    assert_eq!(h.trades.trades(), vec![trade]);
    let entries = h.alerts.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].price, 100.3);
}

#[tokio::test(start_paused = true)]
async fn rejected_entry_aborts_with_alert() {
    let h = harness(ExecutionMode::Testnet, true, config(10));
    h.venue.script_prices(SYMBOL, [Some(50.0), Some(49.8)]);
    h.venue.reject_orders(true);

    let outcome = h
        .lifecycle
        .run(Signal::new(SYMBOL, Side::Short, 0.6, 2))
        .await
        .unwrap();
    assert!(matches!(outcome, LifecycleOutcome::Aborted { .. }));
    assert_eq!(h.venue.submitted_orders().len(), 1);
    assert_eq!(h.alerts.failures().len(), 1);
    assert!(h.trades.trades().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_balance_aborts_before_any_order() {
    let h = harness(ExecutionMode::Testnet, true, config(10));
    h.venue.set_balance("USDT", 0.0);
    h.venue.script_prices(SYMBOL, [Some(50.0), Some(50.5)]);

    let outcome = h
        .lifecycle
        .run(Signal::new(SYMBOL, Side::Long, 0.6, 2))
        .await
        .unwrap();
    match outcome {
        LifecycleOutcome::Aborted { reason } => assert!(reason.contains("insufficient funds")),
        other => panic!("expected abort, got {other:?}"),
    }
    assert!(h.venue.submitted_orders().is_empty());
}

// ── Orchestrator ─────────────────────────────────────────────────────

fn orchestrator(venue: Arc<PaperVenue>, cfg: EngineConfig) -> (Orchestrator, Arc<MemoryTradeLog>) {
    let gateway = Arc::new(Gateway::connect(venue, ExecutionMode::Testnet).unwrap());
    let trades = Arc::new(MemoryTradeLog::new());
    let orch = Orchestrator::new(gateway, cfg, trades.clone(), Arc::new(MemoryAlerts::new()));
    (orch, trades)
}

#[tokio::test(start_paused = true)]
async fn orchestrator_filters_and_drains() {
    let venue = Arc::new(PaperVenue::new("paper"));
    venue.set_price(SYMBOL, 100.0);
    venue.set_price("BTCUSDT", 100.0);
    let mut cfg = config(3);
    cfg.signals.min_confidence = 0.5;
    let (orch, trades) = orchestrator(venue.clone(), cfg);

    let (tx, rx) = mpsc::channel(16);
    let a = Signal::new(SYMBOL, Side::Long, 0.9, 9);
    tx.send(a.clone()).await.unwrap();
    tx.send(a).await.unwrap();
    tx.send(Signal::new(SYMBOL, Side::Long, 1.5, 9)).await.unwrap();
    tx.send(Signal::new("BTCUSDT", Side::Short, 0.2, 9)).await.unwrap();
    tx.send(Signal::new("BTCUSDT", Side::Short, 0.8, 4)).await.unwrap();
    drop(tx);

    let summary = orch.run(rx).await.unwrap();
    assert_eq!(summary.received, 5);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.expired, 2);
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.panicked, 0);
    assert!(venue.submitted_orders().is_empty());
    assert!(trades.trades().is_empty());
}

#[tokio::test(start_paused = true)]
async fn same_news_line_twice_is_a_duplicate() {
    let venue = Arc::new(PaperVenue::new("paper"));
    venue.set_price(SYMBOL, 100.0);
    let (mut orch, _) = orchestrator(venue.clone(), config(3));

    let line = r#"{"symbol":"ETHUSDT","direction":"long","confidence":0.9,"impact":9,
        "source_title":"ETF inflows","source_url":"https://news/eth/1"}"#;
    let first: Signal = serde_json::from_str(line).unwrap();
    let second: Signal = serde_json::from_str(line).unwrap();

    let accepted = orch.submit(first);
    let Submission::Accepted(id) = accepted else {
        panic!("expected the first copy to be accepted, got {accepted:?}");
    };
    assert_eq!(orch.submit(second), Submission::Duplicate(id));

    let (tx, rx) = mpsc::channel(1);
    drop(tx);
    let summary = orch.run(rx).await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.duplicate, 1);
    assert_eq!(summary.expired, 1);
    assert!(venue.submitted_orders().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_in_flight_lifecycles() {
    let venue = Arc::new(PaperVenue::new("paper"));
    venue.set_price(SYMBOL, 100.0);
    let (orch, _) = orchestrator(venue, config(600));

    let (tx, rx) = mpsc::channel(4);
    tx.send(Signal::new(SYMBOL, Side::Long, 0.9, 9)).await.unwrap();

    let shutdown = tokio::time::sleep(std::time::Duration::from_secs(5));
    let summary = orch
        .run_until(rx, async move {
            shutdown.await;
        })
        .await
        .unwrap();
    drop(tx);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.expired, 0);
}

/// A venue that passes the testnet check at connect time and then reports
/// itself as mainnet.
struct FlippingVenue {
    inner: PaperVenue,
    testnet: AtomicBool,
}

#[async_trait]
impl MarketData for FlippingVenue {
    fn name(&self) -> &str {
        "flipping"
    }

    async fn price(&self, symbol: &str) -> Result<Price, VenueError> {
        self.inner.price(symbol).await
    }

    async fn balance(&self, asset: &str) -> Result<f64, VenueError> {
        self.inner.balance(asset).await
    }

    async fn position(&self, symbol: &str) -> Result<Option<VenuePosition>, VenueError> {
        self.inner.position(symbol).await
    }
}

#[async_trait]
impl OrderEntry for FlippingVenue {
    fn is_testnet(&self) -> bool {
        self.testnet.load(Ordering::SeqCst)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.inner.submit_order(order).await
    }

    async fn close_position(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> Result<OrderAck, VenueError> {
        self.inner.close_position(symbol, side, quantity).await
    }
}

#[tokio::test(start_paused = true)]
async fn safety_violation_halts_the_orchestrator() {
    let inner = PaperVenue::new("paper");
    inner.set_balance("USDT", 10_000.0);
    inner.script_prices(SYMBOL, [Some(100.0), Some(101.0)]);
    inner.set_price("BTCUSDT", 100.0);
    let venue = Arc::new(FlippingVenue {
        inner,
        testnet: AtomicBool::new(true),
    });
    let gateway = Arc::new(Gateway::connect(venue.clone(), ExecutionMode::Testnet).unwrap());
    venue.testnet.store(false, Ordering::SeqCst);

    let orch = Orchestrator::new(
        gateway,
        config(30),
        Arc::new(MemoryTradeLog::new()),
        Arc::new(MemoryAlerts::new()),
    );
    let (tx, rx) = mpsc::channel(4);
    tx.send(Signal::new(SYMBOL, Side::Long, 0.9, 9)).await.unwrap();
    // never confirms; must be torn down by the violation
    tx.send(Signal::new("BTCUSDT", Side::Long, 0.9, 9)).await.unwrap();

    let err = orch.run(rx).await.unwrap_err();
    let EngineError::Safety { source, .. } = err;
    assert!(source.is_fatal());
    assert!(venue.inner.submitted_orders().is_empty());
    drop(tx);
}
