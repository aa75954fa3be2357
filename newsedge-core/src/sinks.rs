//! Trade and alert sinks.
//!
//! Persistence and notification delivery live outside the engine. The
//! lifecycle hands finished trades to a `TradeRecorder` and entry/failure
//! notices to an `AlertSink`; a sink error is logged by the caller and never
//! aborts a lifecycle.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Side, SignalId, Trade};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("sink serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait TradeRecorder: Send + Sync {
    fn record(&self, trade: &Trade) -> Result<(), SinkError>;
}

/// Summary sent once a position is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAlert {
    pub signal_id: SignalId,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub confidence: f64,
}

impl fmt::Display for EntryAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {:.4} qty {:.6} (confidence {:.0}%)",
            self.side.as_str().to_uppercase(),
            self.symbol,
            self.price,
            self.quantity,
            self.confidence * 100.0
        )
    }
}

/// Summary sent when a lifecycle aborts after confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAlert {
    pub signal_id: SignalId,
    pub symbol: String,
    pub side: Side,
    pub reason: String,
}

impl fmt::Display for FailureAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} aborted: {}",
            self.side.as_str().to_uppercase(),
            self.symbol,
            self.reason
        )
    }
}

pub trait AlertSink: Send + Sync {
    fn entry(&self, alert: &EntryAlert) -> Result<(), SinkError>;

    fn failure(&self, alert: &FailureAlert) -> Result<(), SinkError>;
}

/// Append-only JSONL trade log, one trade per line.
pub struct JsonlTradeLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlTradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every trade in the log. Malformed lines are skipped.
    pub fn read_all(&self) -> Result<Vec<Trade>, SinkError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut trades = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Trade>(&line) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping malformed trade line"),
            }
        }
        Ok(trades)
    }
}

impl TradeRecorder for JsonlTradeLog {
    fn record(&self, trade: &Trade) -> Result<(), SinkError> {
        let json = serde_json::to_string(trade)?;
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTradeLog {
    trades: Mutex<Vec<Trade>>,
}

impl MemoryTradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Trade>> {
        self.trades.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.guard().clone()
    }
}

impl TradeRecorder for MemoryTradeLog {
    fn record(&self, trade: &Trade) -> Result<(), SinkError> {
        self.guard().push(trade.clone());
        Ok(())
    }
}

/// Alerts emitted as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerts;

impl AlertSink for LogAlerts {
    fn entry(&self, alert: &EntryAlert) -> Result<(), SinkError> {
        info!(signal_id = %alert.signal_id, alert = %alert, "entry alert");
        Ok(())
    }

    fn failure(&self, alert: &FailureAlert) -> Result<(), SinkError> {
        warn!(signal_id = %alert.signal_id, alert = %alert, "failure alert");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAlerts {
    entries: Mutex<Vec<EntryAlert>>,
    failures: Mutex<Vec<FailureAlert>>,
}

impl MemoryAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<EntryAlert> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn failures(&self) -> Vec<FailureAlert> {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl AlertSink for MemoryAlerts {
    fn entry(&self, alert: &EntryAlert) -> Result<(), SinkError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(alert.clone());
        Ok(())
    }

    fn failure(&self, alert: &FailureAlert) -> Result<(), SinkError> {
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, OrderId, Position};
    use crate::stops::StopTier;
    use chrono::Utc;

    fn trade(exit: f64) -> Trade {
        let pos = Position::open("BTCUSDT", Side::Long, 0.5, 100.0, 3.0, Utc::now(), OrderId::from(1));
        Trade::close(
            &pos,
            exit,
            ExitReason::Stop {
                tier: StopTier::Breakeven,
                peak_return: 0.02,
            },
            0.7,
            Utc::now(),
        )
    }

    #[test]
    fn jsonl_log_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlTradeLog::new(dir.path().join("nested").join("trades.jsonl"));
        log.record(&trade(101.0)).unwrap();
        log.record(&trade(99.0)).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let trades = log.read_all().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].exit_price, 101.0);
        assert!(trades[0].is_winner());
        assert!(!trades[1].is_winner());
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlTradeLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn entry_alert_renders_summary() {
        let alert = EntryAlert {
            signal_id: SignalId::from_parts(&["x"]),
            symbol: "ETHUSDT".into(),
            side: Side::Short,
            price: 2500.5,
            quantity: 1.25,
            confidence: 0.82,
        };
        assert_eq!(
            alert.to_string(),
            "SHORT ETHUSDT @ 2500.5000 qty 1.250000 (confidence 82%)"
        );
    }
}
