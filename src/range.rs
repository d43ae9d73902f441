//! Reference-session range tracker
//!
//! Accumulates the high/low extremes over bars falling inside the reference
//! ("Asian") window. The committed range defines the breakout thresholds for
//! the trading window that follows.

use crate::{Bar, SessionWindow};
use serde::{Deserialize, Serialize};

/// High/low range accumulated over the reference window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeTracker {
    pub high: f64,
    pub low: f64,
    pub committed: bool,
}

impl Default for RangeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeTracker {
    pub fn new() -> Self {
        Self {
            high: f64::NEG_INFINITY,
            low: f64::INFINITY,
            committed: false,
        }
    }

    /// Widen the range if the bar falls inside the reference window.
    /// Bars outside the window are a strict no-op.
    pub fn observe(&mut self, bar: &Bar, reference: &SessionWindow) {
        if !reference.contains(bar.timestamp.time()) {
            return;
        }
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.committed = true;
    }

    /// True once at least one reference-window bar has been observed.
    ///
    /// If the reference window never produces a bar (a gap in the data) this
    /// stays false and no entries are possible for that cycle. That is a
    /// normal outcome, not an error.
    pub fn is_ready(&self) -> bool {
        self.committed
    }

    /// Restore the initial state for the next session cycle.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
