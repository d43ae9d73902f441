//! Live-session state persistence
//!
//! A versioned, explicitly-typed snapshot of the engine (position, equity,
//! range accumulator, outstanding orders) plus a SQLite store with JSON
//! backup export for crash recovery of live sessions.
//!
//! A snapshot must round-trip: restoring it into a fresh engine and feeding
//! the same subsequent bars yields decisions identical to a run that was
//! never interrupted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

use crate::range::RangeTracker;
use crate::{Direction, Position, Trade};

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// State persistence and snapshot integrity errors
#[derive(Debug, Error)]
pub enum StateError {
    #[error("snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error(
        "corrupt position state: stop_loss={stop_loss}, take_profit={take_profit}, size={size}"
    )]
    CorruptPosition {
        stop_loss: f64,
        take_profit: f64,
        size: f64,
    },

    #[error("non-finite equity in snapshot: {0}")]
    CorruptEquity(f64),
}

/// An order submitted to the execution venue and not yet resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub direction: Direction,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub submitted_at: DateTime<Utc>,
}

/// Versioned engine snapshot
///
/// Serialized range extremes use `None` for the unset (infinite) sentinel
/// values so the JSON form stays portable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub equity: f64,
    pub position: Option<Position>,
    pub open_orders: Vec<OpenOrder>,
    pub range_high: Option<f64>,
    pub range_low: Option<f64>,
    pub range_committed: bool,
    /// Timestamp of the last bar the engine processed; the live loop uses it
    /// to skip already-seen bars after a restart
    pub last_bar_time: Option<DateTime<Utc>>,
}

impl EngineSnapshot {
    pub fn new(
        equity: f64,
        position: Option<Position>,
        open_orders: Vec<OpenOrder>,
        range: &RangeTracker,
        last_bar_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            equity,
            position,
            open_orders,
            range_high: range.committed.then_some(range.high),
            range_low: range.committed.then_some(range.low),
            range_committed: range.committed,
            last_bar_time,
        }
    }

    /// Rebuild the range accumulator carried by this snapshot
    pub fn range(&self) -> RangeTracker {
        if self.range_committed {
            RangeTracker {
                high: self.range_high.unwrap_or(f64::NEG_INFINITY),
                low: self.range_low.unwrap_or(f64::INFINITY),
                committed: true,
            }
        } else {
            RangeTracker::new()
        }
    }

    /// Reject snapshots from an unknown schema or with tampered numerics.
    /// Corruption here is fatal for the restore, never silently defaulted.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(StateError::VersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if !self.equity.is_finite() {
            return Err(StateError::CorruptEquity(self.equity));
        }
        if let Some(pos) = &self.position {
            if !pos.stop_loss.is_finite()
                || !pos.take_profit.is_finite()
                || !pos.size.is_finite()
                || pos.size <= 0.0
            {
                return Err(StateError::CorruptPosition {
                    stop_loss: pos.stop_loss,
                    take_profit: pos.take_profit,
                    size: pos.size,
                });
            }
        }
        Ok(())
    }
}

/// SQLite-backed state store with JSON backup
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
    json_backup_path: PathBuf,
    auto_backup: bool,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(db_path: P, json_backup_path: P, auto_backup: bool) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = json_backup_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            json_backup_path: json_backup_path.as_ref().to_path_buf(),
            auto_backup,
        };

        store.create_tables()?;
        info!("SQLite state store initialized");

        Ok(store)
    }

    /// Open a store inside `state_dir` with the default file names
    pub fn open_in<P: AsRef<Path>>(state_dir: P) -> Result<Self> {
        let state_dir = state_dir.as_ref();
        std::fs::create_dir_all(state_dir)?;
        Self::new(
            state_dir.join("session_state.db"),
            state_dir.join("session_state.json"),
            true,
        )
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                saved_at TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_time TEXT NOT NULL,
                exit_time TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                size REAL NOT NULL,
                pnl REAL NOT NULL,
                exit_reason TEXT NOT NULL,
                equity_after REAL NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    /// Persist a snapshot, validating it first
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<()> {
        snapshot.validate()?;

        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO snapshots (saved_at, snapshot) VALUES (?1, ?2)",
                params![
                    snapshot.saved_at.to_rfc3339(),
                    serde_json::to_string(snapshot)?
                ],
            )?;
        }

        debug!(equity = snapshot.equity, "Snapshot saved");

        if self.auto_backup {
            self.export_json()?;
        }

        Ok(())
    }

    /// Load the most recent snapshot, if any. The snapshot is validated
    /// before being handed back; a corrupted row aborts the restore.
    pub fn load_snapshot(&self) -> Result<Option<EngineSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT snapshot FROM snapshots ORDER BY id DESC LIMIT 1")?;

        let row: Result<String, _> = stmt.query_row([], |row| row.get(0));
        match row {
            Ok(json) => {
                let snapshot: EngineSnapshot =
                    serde_json::from_str(&json).context("Failed to parse stored snapshot")?;
                snapshot.validate()?;
                info!(
                    equity = snapshot.equity,
                    has_position = snapshot.position.is_some(),
                    "Loaded snapshot"
                );
                Ok(Some(snapshot))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                debug!("No snapshot found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append a completed trade to the audit trail
    pub fn record_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trades
             (entry_time, exit_time, direction, entry_price, exit_price,
              size, pnl, exit_reason, equity_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trade.entry_time.to_rfc3339(),
                trade.exit_time.to_rfc3339(),
                trade.direction.to_string(),
                trade.entry_price,
                trade.exit_price,
                trade.size,
                trade.pnl,
                trade.exit_reason.to_string(),
                trade.equity_after,
            ],
        )?;

        let result = if trade.pnl > 0.0 { "WIN" } else { "LOSS" };
        info!(
            "Trade recorded: {} {:.2} @ {:.2} -> {:.2} | PnL {:+.2} | {} | {}",
            trade.direction,
            trade.size,
            trade.entry_price,
            trade.exit_price,
            trade.pnl,
            trade.exit_reason,
            result
        );

        Ok(())
    }

    /// Write the latest snapshot to the JSON backup file
    pub fn export_json(&self) -> Result<()> {
        let snapshot = self.load_snapshot()?;
        let state = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "snapshot": snapshot,
        });
        std::fs::write(&self.json_backup_path, serde_json::to_string_pretty(&state)?)?;
        debug!("State exported to: {}", self.json_backup_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_position() -> Position {
        Position::open(
            Direction::Long,
            Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap(),
            2000.0,
            1990.0,
            2020.0,
            0.1,
        )
    }

    fn sample_range() -> RangeTracker {
        RangeTracker {
            high: 2000.0,
            low: 1990.0,
            committed: true,
        }
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let snapshot =
            EngineSnapshot::new(10_500.0, Some(sample_position()), Vec::new(), &sample_range(), None);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: EngineSnapshot = serde_json::from_str(&json).unwrap();
        restored.validate().unwrap();

        assert_eq!(restored.equity, 10_500.0);
        assert_eq!(restored.range().high, 2000.0);
        assert_eq!(restored.range().low, 1990.0);
        assert!(restored.range().committed);
        assert_eq!(restored.position.unwrap().entry_price, 2000.0);
    }

    #[test]
    fn test_uncommitted_range_serializes_without_sentinels() {
        let snapshot = EngineSnapshot::new(10_000.0, None, Vec::new(), &RangeTracker::new(), None);
        assert_eq!(snapshot.range_high, None);
        assert_eq!(snapshot.range_low, None);

        let restored = snapshot.range();
        assert!(!restored.committed);
        assert_eq!(restored.high, f64::NEG_INFINITY);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut snapshot = EngineSnapshot::new(10_000.0, None, Vec::new(), &RangeTracker::new(), None);
        snapshot.version = 99;
        assert!(matches!(
            snapshot.validate().unwrap_err(),
            StateError::VersionMismatch { found: 99, .. }
        ));
    }

    #[test]
    fn test_corrupt_position_rejected() {
        let mut pos = sample_position();
        pos.take_profit = f64::INFINITY;
        let snapshot = EngineSnapshot::new(10_000.0, Some(pos), Vec::new(), &sample_range(), None);
        assert!(matches!(
            snapshot.validate().unwrap_err(),
            StateError::CorruptPosition { .. }
        ));
    }

    #[test]
    fn test_store_save_and_load() {
        let dir = std::env::temp_dir().join(format!(
            "session-breakout-test-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = StateStore::open_in(&dir).unwrap();

        assert!(store.load_snapshot().unwrap().is_none());

        let snapshot =
            EngineSnapshot::new(10_250.0, Some(sample_position()), Vec::new(), &sample_range(), None);
        store.save_snapshot(&snapshot).unwrap();

        let loaded = store.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.equity, 10_250.0);
        assert!(loaded.position.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
