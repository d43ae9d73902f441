//! Session clock
//!
//! Classifies a bar's time-of-day against configured session windows,
//! including windows that cross midnight.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// A time-of-day window in the broker timezone.
///
/// When `start <= end` the window is same-day `[start, end)`. When
/// `start > end` it crosses midnight and is active for
/// `time >= start || time < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Is the given time-of-day inside this window?
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl std::fmt::Display for SessionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_same_day_window_half_open() {
        let w = SessionWindow::new(t(3, 30), t(13, 30));
        assert!(!w.contains(t(3, 29)));
        assert!(w.contains(t(3, 30)));
        assert!(w.contains(t(10, 0)));
        assert!(!w.contains(t(13, 30)));
        assert!(!w.contains(t(21, 0)));
    }

    #[test]
    fn test_midnight_crossing_window() {
        let w = SessionWindow::new(t(22, 0), t(2, 0));
        assert!(w.contains(t(22, 0)));
        assert!(w.contains(t(23, 59)));
        assert!(w.contains(t(0, 0)));
        assert!(w.contains(t(1, 59)));
        assert!(!w.contains(t(2, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn test_degenerate_window_start_equals_end() {
        // start == end is a same-day empty window
        let w = SessionWindow::new(t(9, 0), t(9, 0));
        assert!(!w.contains(t(9, 0)));
        assert!(!w.contains(t(12, 0)));
    }
}
