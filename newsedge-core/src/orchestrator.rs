//! Orchestrator: one supervised lifecycle per accepted signal.
//!
//! Lifecycles run in a `JoinSet` owned by the orchestrator, so shutdown can be
//! awaited and a panicking lifecycle is counted instead of lost. A safety
//! violation in any lifecycle aborts all of them.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::{self, Future};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::domain::{Signal, SignalId};
use crate::gateway::Gateway;
use crate::lifecycle::{EngineError, Lifecycle, LifecycleOutcome};
use crate::sinks::{AlertSink, TradeRecorder};

/// Bounded set of signal ids already seen. The oldest id is evicted first.
#[derive(Debug)]
pub struct SeenSignals {
    capacity: usize,
    order: VecDeque<SignalId>,
    ids: HashSet<SignalId>,
}

impl SeenSignals {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Record `id`. Returns false if it was already present.
    pub fn insert(&mut self, id: SignalId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn contains(&self, id: &SignalId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted(SignalId),
    Duplicate(SignalId),
    /// Failed validation or the confidence floor.
    Rejected(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub received: usize,
    pub accepted: usize,
    pub duplicate: usize,
    pub rejected: usize,
    pub expired: usize,
    pub aborted: usize,
    pub closed: usize,
    pub panicked: usize,
    pub cancelled: usize,
    pub realized_pnl: f64,
}

type Symbols = Arc<Mutex<HashMap<String, usize>>>;

/// Counts a lifecycle as in flight for its symbol until dropped, which also
/// happens when the task panics or is aborted.
struct InFlight {
    symbols: Symbols,
    symbol: String,
}

impl InFlight {
    fn enter(symbols: &Symbols, symbol: &str) -> (Self, usize) {
        let mut map = symbols.lock().unwrap_or_else(|p| p.into_inner());
        let count = map.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        let now = *count;
        drop(map);
        (
            Self {
                symbols: symbols.clone(),
                symbol: symbol.to_string(),
            },
            now,
        )
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut map = self.symbols.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = map.get_mut(&self.symbol) {
            *count -= 1;
            if *count == 0 {
                map.remove(&self.symbol);
            }
        }
    }
}

pub struct Orchestrator {
    lifecycle: Arc<Lifecycle>,
    seen: SeenSignals,
    tasks: JoinSet<Result<LifecycleOutcome, EngineError>>,
    symbols: Symbols,
    summary: RunSummary,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<Gateway>,
        config: EngineConfig,
        recorder: Arc<dyn TradeRecorder>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let seen = SeenSignals::new(config.signals.dedup_capacity);
        Self {
            lifecycle: Arc::new(Lifecycle::new(gateway, config, recorder, alerts)),
            seen,
            tasks: JoinSet::new(),
            symbols: Arc::new(Mutex::new(HashMap::new())),
            summary: RunSummary::default(),
        }
    }

    /// Lifecycles spawned and not yet joined.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Validate, de-duplicate and spawn a lifecycle for `signal`.
    pub fn submit(&mut self, signal: Signal) -> Submission {
        self.summary.received += 1;
        if let Err(e) = signal.validate() {
            warn!(symbol = %signal.symbol, error = %e, "signal rejected");
            self.summary.rejected += 1;
            return Submission::Rejected(e.to_string());
        }
        let min_confidence = self.lifecycle.config().signals.min_confidence;
        if signal.confidence < min_confidence {
            debug!(
                symbol = %signal.symbol,
                confidence = signal.confidence,
                min_confidence,
                "signal below confidence floor"
            );
            self.summary.rejected += 1;
            return Submission::Rejected(format!(
                "confidence {} below {min_confidence}",
                signal.confidence
            ));
        }
        let id = signal.id();
        if !self.seen.insert(id.clone()) {
            debug!(signal_id = %id, symbol = %signal.symbol, "duplicate signal dropped");
            self.summary.duplicate += 1;
            return Submission::Duplicate(id);
        }

        let (guard, concurrent) = InFlight::enter(&self.symbols, &signal.symbol);
        if concurrent > 1 {
            warn!(
                signal_id = %id,
                symbol = %signal.symbol,
                concurrent,
                "another lifecycle is already in flight for this symbol"
            );
        }

        let span = info_span!("lifecycle", signal_id = %id, symbol = %signal.symbol);
        let lifecycle = self.lifecycle.clone();
        self.tasks.spawn(
            async move {
                let _guard = guard;
                lifecycle.run(signal).await
            }
            .instrument(span),
        );
        self.summary.accepted += 1;
        Submission::Accepted(id)
    }

    /// Consume `signals` until the channel closes, then wait for every
    /// lifecycle to finish.
    pub async fn run(self, signals: mpsc::Receiver<Signal>) -> Result<RunSummary, EngineError> {
        self.run_until(signals, future::pending()).await
    }

    /// Like `run`, but `shutdown` resolving aborts every in-flight lifecycle.
    pub async fn run_until<F>(
        mut self,
        mut signals: mpsc::Receiver<Signal>,
        shutdown: F,
    ) -> Result<RunSummary, EngineError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut open = true;
        loop {
            if !open && self.tasks.is_empty() {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!(in_flight = self.tasks.len(), "shutdown requested; aborting lifecycles");
                    self.tasks.abort_all();
                    break;
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.settle(joined).await?;
                }
                received = signals.recv(), if open => match received {
                    Some(signal) => {
                        self.submit(signal);
                    }
                    None => {
                        debug!("signal stream closed; draining lifecycles");
                        open = false;
                    }
                },
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            self.settle(joined).await?;
        }
        info!(
            accepted = self.summary.accepted,
            closed = self.summary.closed,
            expired = self.summary.expired,
            aborted = self.summary.aborted,
            panicked = self.summary.panicked,
            realized_pnl = self.summary.realized_pnl,
            "orchestrator stopped"
        );
        Ok(self.summary)
    }

    async fn settle(
        &mut self,
        joined: Result<Result<LifecycleOutcome, EngineError>, JoinError>,
    ) -> Result<(), EngineError> {
        match joined {
            Ok(Ok(LifecycleOutcome::Expired(_))) => self.summary.expired += 1,
            Ok(Ok(LifecycleOutcome::Aborted { .. })) => self.summary.aborted += 1,
            Ok(Ok(LifecycleOutcome::Closed(trade))) => {
                self.summary.closed += 1;
                self.summary.realized_pnl += trade.pnl;
            }
            Ok(Err(e)) => {
                error!(error = %e, "fatal lifecycle error; aborting all lifecycles");
                self.tasks.abort_all();
                while self.tasks.join_next().await.is_some() {}
                return Err(e);
            }
            Err(e) if e.is_panic() => {
                error!(error = %e, "lifecycle panicked");
                self.summary.panicked += 1;
            }
            Err(_) => self.summary.cancelled += 1,
        }
        Ok(())
    }
}
