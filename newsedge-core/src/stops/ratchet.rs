/// Ratchet invariant enforcement
///
/// **Core Rule:** Stops may tighten, never loosen.
///
/// A tier's candidate can sit behind the current stop (e.g. a Lock candidate
/// computed from a peak just above the Breakeven stop). The ratchet keeps the
/// tighter of the two.
use crate::domain::Side;

/// Ratchet state for a stop level.
///
/// - Long positions: stop can only rise
/// - Short positions: stop can only fall
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetState {
    current_level: Option<f64>,
    side: Side,
}

impl RatchetState {
    pub fn new(side: Side) -> Self {
        Self {
            current_level: None,
            side,
        }
    }

    pub fn with_initial_level(side: Side, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            side,
        }
    }

    /// Apply ratchet to a proposed stop level.
    ///
    /// Returns the ratcheted level. The first proposal initializes the level.
    ///
    /// # Example
    /// ```
    /// use newsedge_core::domain::Side;
    /// use newsedge_core::stops::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Side::Long, 96.5);
    /// assert_eq!(ratchet.apply(100.2), 100.2);
    /// // Loosening is blocked
    /// assert_eq!(ratchet.apply(99.0), 100.2);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        let level = match self.current_level {
            None => proposed,
            Some(current) => match self.side {
                Side::Long => current.max(proposed),
                Side::Short => current.min(proposed),
            },
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }

    pub fn side(&self) -> Side {
        self.side
    }
}
