use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a signal (BLAKE3 over its identifying fields).
///
/// Two deliveries of the same news event hash to the same id, which is what
/// the orchestrator's seen-set keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn from_parts(parts: &[&str]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part.as_bytes());
            // separator so ("ab","c") and ("a","bc") differ
            hasher.update(&[0x1f]);
        }
        Self(hasher.finalize().to_hex()[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-assigned order id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_id_deterministic() {
        let a = SignalId::from_parts(&["BTCUSDT", "long", "headline"]);
        let b = SignalId::from_parts(&["BTCUSDT", "long", "headline"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn signal_id_separates_fields() {
        let a = SignalId::from_parts(&["ab", "c"]);
        let b = SignalId::from_parts(&["a", "bc"]);
        assert_ne!(a, b);
    }
}
