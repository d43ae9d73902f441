//! Bar data loading and feeds
//!
//! CSV loading of historical OHLCV series plus the feed contract the live
//! loop polls for newly closed bars. The engine accepts any ordered bar
//! source; validation happens once before any simulation proceeds.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::Bar;

/// Data errors surfaced before the simulation loop
#[derive(Debug, Error)]
pub enum DataError {
    #[error("bar source is empty")]
    EmptySeries,

    #[error("non-monotonic timestamps at index {index}: {previous} followed by {current}")]
    NonMonotonic {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Check ordering invariants before any bar is processed.
/// The engine does not attempt partial recovery on bad data.
pub fn validate_bars(bars: &[Bar]) -> Result<(), DataError> {
    if bars.is_empty() {
        return Err(DataError::EmptySeries);
    }
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(DataError::NonMonotonic {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

/// Load OHLCV bars from a CSV file with columns
/// `datetime,open,high,low,close,volume`
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut bars = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let timestamp = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // Broker exports use naive local wall-clock timestamps
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .with_context(|| format!("Failed to parse datetime '{}' at row {}", dt_str, row_idx + 1))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .with_context(|| format!("Failed to parse open at row {}", row_idx + 1))?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .with_context(|| format!("Failed to parse high at row {}", row_idx + 1))?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .with_context(|| format!("Failed to parse low at row {}", row_idx + 1))?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .with_context(|| format!("Failed to parse close at row {}", row_idx + 1))?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .with_context(|| format!("Failed to parse volume at row {}", row_idx + 1))?;

        bars.push(Bar::new_unchecked(timestamp, open, high, low, close, volume));
    }

    info!(bars = bars.len(), "Loaded CSV data");
    Ok(bars)
}

/// Source of closed bars for the live loop
///
/// `latest_closed` returns the most recently completed bar, or `None` when no
/// bar has closed yet; the caller deduplicates by timestamp. `day_history`
/// returns every closed bar of the given trading day in order, for
/// replay-on-startup.
pub trait BarFeed: Send {
    fn latest_closed(&mut self) -> Result<Option<Bar>>;
    fn day_history(&mut self, day: NaiveDate) -> Result<Vec<Bar>>;
}

/// Feed over an in-memory series, used for paper sessions and tests
pub struct ReplayFeed {
    bars: Vec<Bar>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars, cursor: 0 }
    }
}

impl BarFeed for ReplayFeed {
    fn latest_closed(&mut self) -> Result<Option<Bar>> {
        if self.cursor < self.bars.len() {
            let bar = self.bars[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(bar))
        } else {
            Ok(None)
        }
    }

    fn day_history(&mut self, day: NaiveDate) -> Result<Vec<Bar>> {
        Ok(self
            .bars
            .iter()
            .filter(|b| b.timestamp.date_naive() == day)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn bar_at(h: u32, m: u32) -> Bar {
        Bar::new_unchecked(
            Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap(),
            100.0,
            101.0,
            99.0,
            100.0,
            1.0,
        )
    }

    #[test]
    fn test_validate_empty_series() {
        assert!(matches!(validate_bars(&[]), Err(DataError::EmptySeries)));
    }

    #[test]
    fn test_validate_non_monotonic() {
        let bars = vec![bar_at(14, 0), bar_at(13, 0)];
        assert!(matches!(
            validate_bars(&bars),
            Err(DataError::NonMonotonic { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_accepts_equal_and_increasing() {
        let bars = vec![bar_at(13, 0), bar_at(13, 15), bar_at(13, 30)];
        assert!(validate_bars(&bars).is_ok());
    }

    #[test]
    fn test_load_csv_naive_datetimes() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("session-breakout-csv-{}.csv", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "datetime,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-03-01 13:30:00,2000.0,2001.0,1999.0,2000.5,120").unwrap();
        writeln!(f, "2024-03-01 13:45:00,2000.5,2002.0,2000.0,2001.0,130").unwrap();

        let bars = load_csv(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 2000.5);
        assert_eq!(bars[1].timestamp.time().to_string(), "13:45:00");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_csv_bad_row_reports_row_number() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("session-breakout-bad-{}.csv", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "datetime,open,high,low,close,volume").unwrap();
        writeln!(f, "2024-03-01 13:30:00,not-a-number,2001.0,1999.0,2000.5,120").unwrap();

        let err = load_csv(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("row 1"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_replay_feed_day_history() {
        let mut feed = ReplayFeed::new(vec![bar_at(4, 0), bar_at(14, 0)]);
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(feed.day_history(day).unwrap().len(), 2);

        let other = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(feed.day_history(other).unwrap().is_empty());
    }
}
