//! Hindsight alignment.
//!
//! Recorded event timestamps are imprecise, so the decision point is taken
//! as the tick of peak realized volatility (`(high - low) / open`) inside the
//! window, ignoring `guard` ticks at each edge. When the window is too short
//! for the guard band, the anchor falls back to the first tick at or after
//! the signal timestamp, else tick 0 (also when the signal has no timestamp).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use newsedge_core::domain::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMethod {
    Volatility,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub index: usize,
    pub method: AnchorMethod,
    pub range_pct: f64,
}

pub fn find_event_anchor(
    ticks: &[Tick],
    signal_time: Option<DateTime<Utc>>,
    guard: usize,
) -> Anchor {
    let searchable = ticks.len() > guard.saturating_mul(2);
    let best = if searchable {
        ticks[guard..ticks.len() - guard]
            .iter()
            .enumerate()
            .map(|(i, t)| (guard + i, t.range_pct()))
            .filter(|(_, r)| r.is_finite())
            // first index wins ties
            .fold(None::<(usize, f64)>, |best, (i, r)| match best {
                Some((_, br)) if br >= r => best,
                _ => Some((i, r)),
            })
    } else {
        None
    };

    match best {
        Some((index, range_pct)) => Anchor {
            index,
            method: AnchorMethod::Volatility,
            range_pct,
        },
        None => {
            let index = signal_time
                .and_then(|at| ticks.iter().position(|t| t.timestamp >= at))
                .unwrap_or(0);
            Anchor {
                index,
                method: AnchorMethod::Timestamp,
                range_pct: ticks.get(index).map_or(0.0, Tick::range_pct),
            }
        }
    }
}
