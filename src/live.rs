//! Live trading loop
//!
//! Re-enters the simulation core once per newly closed bar from a polling
//! feed. On startup the current trading day is replayed through the identical
//! per-bar path with order execution suppressed, then the loop hands off to
//! live per-bar invocation. The core never knows whether it is replaying or
//! live.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::data::BarFeed;
use crate::engine::Engine;
use crate::state::{OpenOrder, StateStore};
use crate::{Bar, Direction, Trade};

/// Order execution boundary
///
/// The venue exposes only order submission and closure; fills are not assumed
/// to be synchronous or at the signal price.
pub trait OrderExecutor: Send {
    fn submit(
        &mut self,
        direction: Direction,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<String>;

    fn close(&mut self, order_id: &str) -> Result<()>;
}

/// Executor that fills on paper and logs, used for paper sessions and replay
#[derive(Debug, Default)]
pub struct PaperExecutor {
    next_id: u64,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderExecutor for PaperExecutor {
    fn submit(
        &mut self,
        direction: Direction,
        size: f64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<String> {
        self.next_id += 1;
        let order_id = format!("paper-{}", self.next_id);
        info!(
            %direction,
            size,
            stop_loss,
            take_profit,
            order_id,
            "[PAPER] Order submitted"
        );
        Ok(order_id)
    }

    fn close(&mut self, order_id: &str) -> Result<()> {
        info!(order_id, "[PAPER] Order closed");
        Ok(())
    }
}

/// Explicit polling-loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the feed to produce a bar newer than the last processed
    AwaitingBar,
    /// Running the per-bar path
    ProcessingBar,
    /// An order submission is in flight
    OrderPending,
}

/// Live trader: polling loop around the simulation core
pub struct LiveTrader {
    engine: Engine,
    feed: Box<dyn BarFeed>,
    executor: Box<dyn OrderExecutor>,
    store: StateStore,
    open_orders: Vec<OpenOrder>,
    last_bar_time: Option<DateTime<Utc>>,
    state: LoopState,
}

impl LiveTrader {
    pub fn new(
        config: &Config,
        feed: Box<dyn BarFeed>,
        executor: Box<dyn OrderExecutor>,
        store: StateStore,
    ) -> Result<Self> {
        let mut engine = Engine::new(config)?;
        engine.initialize()?;

        Ok(Self {
            engine,
            feed,
            executor,
            store,
            open_orders: Vec::new(),
            last_bar_time: None,
            state: LoopState::AwaitingBar,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn open_orders(&self) -> &[OpenOrder] {
        &self.open_orders
    }

    /// Restore engine state from the most recent snapshot, if any
    pub fn recover(&mut self) -> Result<()> {
        match self.store.load_snapshot()? {
            Some(snapshot) => {
                self.engine
                    .restore(&snapshot)
                    .context("Snapshot restore failed")?;
                self.open_orders = snapshot.open_orders.clone();
                self.last_bar_time = snapshot.last_bar_time;
                info!(
                    equity = self.engine.equity(),
                    open_orders = self.open_orders.len(),
                    "Recovered previous session state"
                );
            }
            None => {
                info!("No previous session state, starting fresh");
            }
        }
        Ok(())
    }

    /// Replay every closed bar of the given trading day through the per-bar
    /// path with order execution suppressed, catching the core up to now.
    pub fn replay_day(&mut self, day: NaiveDate) -> Result<()> {
        let history = self.feed.day_history(day)?;
        let mut replayed = 0usize;

        for bar in &history {
            if self.is_duplicate(bar) {
                continue;
            }
            self.apply_bar(bar, false)?;
            replayed += 1;
        }

        info!(day = %day, bars = replayed, "Replay complete, switching to live bars");
        Ok(())
    }

    /// Poll the feed once. Returns true when a new bar was processed. A
    /// duplicate poll of an already-seen bar is a strict no-op.
    pub fn poll_once(&mut self) -> Result<bool> {
        let bar = match self.feed.latest_closed()? {
            Some(bar) => bar,
            None => {
                debug!("No closed bar available");
                return Ok(false);
            }
        };

        if self.is_duplicate(&bar) {
            debug!(timestamp = %bar.timestamp, "Bar already processed, skipping");
            return Ok(false);
        }

        self.apply_bar(&bar, true)?;
        Ok(true)
    }

    fn is_duplicate(&self, bar: &Bar) -> bool {
        matches!(self.last_bar_time, Some(last) if bar.timestamp <= last)
    }

    /// Run one bar through the core and, when `execute` is set, mirror the
    /// engine's decisions at the order execution boundary.
    fn apply_bar(&mut self, bar: &Bar, execute: bool) -> Result<()> {
        self.state = LoopState::ProcessingBar;

        let outcome = self.engine.process_bar(bar)?;

        if execute {
            if let Some(trade) = &outcome.closed {
                self.close_orders(trade)?;
            }
            if let Some(position) = &outcome.opened {
                self.state = LoopState::OrderPending;
                match self.executor.submit(
                    position.direction,
                    position.size,
                    position.stop_loss,
                    position.take_profit,
                ) {
                    Ok(order_id) => {
                        self.open_orders.push(OpenOrder {
                            order_id,
                            direction: position.direction,
                            size: position.size,
                            stop_loss: position.stop_loss,
                            take_profit: position.take_profit,
                            submitted_at: bar.timestamp,
                        });
                    }
                    Err(e) => {
                        // The engine keeps tracking the position; the order
                        // will be retried by the operator, not the loop.
                        error!("Order submission failed: {:#}", e);
                    }
                }
            }
        }

        self.last_bar_time = Some(bar.timestamp);
        self.persist()?;
        self.state = LoopState::AwaitingBar;
        Ok(())
    }

    fn close_orders(&mut self, trade: &Trade) -> Result<()> {
        for order in std::mem::take(&mut self.open_orders) {
            if let Err(e) = self.executor.close(&order.order_id) {
                warn!(order_id = order.order_id, "Failed to close order: {:#}", e);
            }
        }
        self.store.record_trade(trade)?;
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.engine.snapshot(self.open_orders.clone());
        self.store.save_snapshot(&snapshot)
    }
}
