//! Recorded inputs: one-second tick CSVs and the events manifest.
//!
//! Tick CSV header: `timestamp,open,high,low,close`. Timestamps are RFC 3339
//! or unix seconds. The manifest is a JSON array of
//! `{ "signal": Signal, "ticks": "<csv path relative to the manifest>" }`.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use newsedge_core::domain::{Signal, SignalId, Tick};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid tick at {path}:{line}: {reason}")]
    InvalidTick {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("no ticks in {0}")]
    Empty(PathBuf),
    #[error("malformed manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid signal in manifest entry {index}: {reason}")]
    InvalidSignal { index: usize, reason: String },
}

/// A recorded event: the signal plus the tick window around it.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: SignalId,
    pub signal: Signal,
    pub ticks: Vec<Tick>,
}

impl Event {
    pub fn new(signal: Signal, ticks: Vec<Tick>) -> Self {
        Self {
            id: signal.id(),
            signal,
            ticks,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    signal: Signal,
    ticks: PathBuf,
}

/// RFC 3339, or integer unix seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

pub fn load_ticks(path: &Path) -> Result<Vec<Tick>, LoadError> {
    let file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_ticks(file, path)
}

/// Parse ticks from any reader; `origin` only labels errors.
pub fn read_ticks<R: Read>(reader: R, origin: &Path) -> Result<Vec<Tick>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: origin.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(csv_err)?.clone();

    let mut ticks: Vec<Tick> = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map_or(0, |p| p.line());
        let invalid = |reason: String| LoadError::InvalidTick {
            path: origin.to_path_buf(),
            line,
            reason,
        };

        let row: TickRow = record
            .deserialize(Some(&headers))
            .map_err(|e| invalid(e.to_string()))?;
        let timestamp = parse_timestamp(&row.timestamp)
            .ok_or_else(|| invalid(format!("unparseable timestamp '{}'", row.timestamp)))?;
        let tick = Tick::new(timestamp, row.open, row.high, row.low, row.close);
        if !tick.is_sane() {
            return Err(invalid(format!(
                "inconsistent OHLC ({}, {}, {}, {})",
                row.open, row.high, row.low, row.close
            )));
        }
        if let Some(prev) = ticks.last() {
            if tick.timestamp < prev.timestamp {
                return Err(invalid("timestamp goes backwards".into()));
            }
        }
        ticks.push(tick);
    }

    if ticks.is_empty() {
        return Err(LoadError::Empty(origin.to_path_buf()));
    }
    debug!(path = %origin.display(), ticks = ticks.len(), "ticks loaded");
    Ok(ticks)
}

/// Load every event listed in a manifest.
pub fn load_events(manifest: &Path) -> Result<Vec<Event>, LoadError> {
    let text = fs::read_to_string(manifest).map_err(|source| LoadError::Io {
        path: manifest.to_path_buf(),
        source,
    })?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&text).map_err(|source| LoadError::Manifest {
            path: manifest.to_path_buf(),
            source,
        })?;
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            entry
                .signal
                .validate()
                .map_err(|e| LoadError::InvalidSignal {
                    index,
                    reason: e.to_string(),
                })?;
            let ticks = load_ticks(&base.join(&entry.ticks))?;
            Ok(Event::new(entry.signal, ticks))
        })
        .collect()
}
