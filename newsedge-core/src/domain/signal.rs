//! Signal: a sentiment-scored news event, produced by an external scorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::SignalId;
use super::position::Side;

/// Errors from signal validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("signal has an empty symbol")]
    EmptySymbol,
    #[error("confidence {0} is outside [0, 1]")]
    Confidence(f64),
    #[error("impact {0} is outside [1, 10]")]
    Impact(u8),
}

/// An immutable trading signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Side,
    /// Scorer confidence in [0, 1].
    pub confidence: f64,
    /// Externally assigned importance in [1, 10].
    pub impact: u8,
    /// When the event happened, if the producer knows. Absent on the
    /// external signal stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_title: String,
    #[serde(default)]
    pub source_url: String,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, direction: Side, confidence: f64, impact: u8) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            confidence,
            impact,
            timestamp: None,
            source_title: String::new(),
            source_url: String::new(),
        }
    }

    pub fn with_source(mut self, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.source_title = title.into();
        self.source_url = url.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.symbol.trim().is_empty() {
            return Err(SignalError::EmptySymbol);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SignalError::Confidence(self.confidence));
        }
        if !(1..=10).contains(&self.impact) {
            return Err(SignalError::Impact(self.impact));
        }
        Ok(())
    }

    /// Content id used for de-duplication.
    ///
    /// Built only from fields the signal carries, so the same news item
    /// parsed twice gets the same id. Scores are excluded.
    pub fn id(&self) -> SignalId {
        let ts = self
            .timestamp
            .map(|t| t.timestamp_millis().to_string())
            .unwrap_or_default();
        SignalId::from_parts(&[
            &self.symbol,
            self.direction.as_str(),
            &ts,
            &self.source_title,
            &self.source_url,
        ])
    }
}
