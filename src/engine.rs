//! Simulation engine
//!
//! Drives bars strictly in input order through the strategy and position
//! manager, executes signals into trade records, and maintains the equity
//! curve. The same per-bar path is used for backtests, live replay, and live
//! polling; the engine never knows which mode it is running in.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::data::validate_bars;
use crate::position::{PositionExit, PositionManager};
use crate::report;
use crate::sizing::PositionSizer;
use crate::state::{EngineSnapshot, OpenOrder, StateError};
use crate::strategy::{BreakoutStrategy, Strategy};
use crate::{Bar, ExitReason, PerformanceMetrics, Position, Signal, Trade};

/// What a single bar did to the engine state, for the execution boundary
#[derive(Debug, Clone, Default)]
pub struct BarOutcome {
    pub opened: Option<Position>,
    pub closed: Option<Trade>,
}

/// Completed backtest output
#[derive(Debug, Default)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub metrics: PerformanceMetrics,
}

/// Bar-by-bar simulation engine
///
/// Single-threaded and synchronous; each instance owns its strategy, position
/// and equity state. Concurrent runs require independently constructed
/// engines.
pub struct Engine {
    strategy: BreakoutStrategy,
    manager: PositionManager,
    sizer: PositionSizer,
    contract_multiplier: f64,
    initial_equity: f64,
    equity: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<(DateTime<Utc>, f64)>,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        let strategy = BreakoutStrategy::from_config(config)?;
        let manager = PositionManager::new(
            config.sessions.trading_window()?,
            config.strategy.trail_trigger_distance(),
            config.strategy.trail_distance(),
        );
        let sizer = PositionSizer::new(&config.sizing, config.strategy.contract_multiplier);

        Ok(Self {
            strategy,
            manager,
            sizer,
            contract_multiplier: config.strategy.contract_multiplier,
            initial_equity: config.trading.initial_equity,
            equity: config.trading.initial_equity,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        })
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, f64)] {
        &self.equity_curve
    }

    /// Prepare the strategy for the first bar
    pub fn initialize(&mut self) -> Result<()> {
        self.strategy.initialize()
    }

    /// Run a full backtest over a validated bar series
    pub fn run(&mut self, bars: &[Bar]) -> Result<BacktestResult> {
        validate_bars(bars)?;

        tracing::info!(bars = bars.len(), "Starting simulation");
        self.initialize()?;

        for bar in bars {
            self.process_bar(bar)?;
        }

        tracing::info!(
            trades = self.trades.len(),
            final_equity = self.equity,
            "Simulation completed"
        );

        let metrics = report::performance_metrics(
            &self.trades,
            &self.equity_curve,
            self.initial_equity,
        );

        Ok(BacktestResult {
            trades: self.trades.clone(),
            equity_curve: self.equity_curve.clone(),
            metrics,
        })
    }

    /// Process one bar: manage the open position, then evaluate the strategy,
    /// then record the post-update equity sample.
    pub fn process_bar(&mut self, bar: &Bar) -> Result<BarOutcome> {
        let mut outcome = BarOutcome::default();

        if let Some(position) = self.position.as_mut() {
            if let Some(exit) = self.manager.manage(position, bar)? {
                outcome.closed = Some(self.close_position(exit, bar.timestamp));
            }
        }

        let signal = self.strategy.on_bar(bar, self.position.as_ref());
        match signal {
            Some(Signal::Entry {
                direction,
                price,
                stop_loss,
                take_profit,
            }) if self.position.is_none() => {
                let stop_distance = (price - stop_loss).abs();
                let size = self.sizer.size_for(self.equity, stop_distance);
                let position =
                    Position::open(direction, bar.timestamp, price, stop_loss, take_profit, size);
                tracing::info!(
                    %direction,
                    price,
                    stop_loss,
                    take_profit,
                    size,
                    "Opened position"
                );
                outcome.opened = Some(position.clone());
                self.position = Some(position);
            }
            Some(Signal::Exit { price, reason }) if self.position.is_some() => {
                outcome.closed =
                    Some(self.close_position(PositionExit { price, reason }, bar.timestamp));
            }
            _ => {}
        }

        self.equity_curve.push((bar.timestamp, self.equity));
        Ok(outcome)
    }

    fn close_position(&mut self, exit: PositionExit, exit_time: DateTime<Utc>) -> Trade {
        // Caller guarantees a position exists when an exit is produced
        let position = self.position.take().expect("exit without open position");

        let pnl = position.price_diff(exit.price) * self.contract_multiplier * position.size;
        self.equity += pnl;

        let trade = Trade {
            entry_time: position.entry_time,
            exit_time,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: exit.price,
            size: position.size,
            pnl,
            exit_reason: exit.reason,
            equity_after: self.equity,
        };

        tracing::info!(
            direction = %trade.direction,
            exit_price = trade.exit_price,
            pnl = trade.pnl,
            reason = %trade.exit_reason,
            equity = self.equity,
            "Closed position"
        );

        self.trades.push(trade.clone());
        trade
    }

    /// Capture the engine state for live resumption
    pub fn snapshot(&self, open_orders: Vec<OpenOrder>) -> EngineSnapshot {
        EngineSnapshot::new(
            self.equity,
            self.position.clone(),
            open_orders,
            self.strategy.range(),
            self.equity_curve.last().map(|(t, _)| *t),
        )
    }

    /// Restore a validated snapshot into this engine. Subsequent decisions
    /// match an engine that was never restarted, given the same bars.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<(), StateError> {
        snapshot.validate()?;
        self.equity = snapshot.equity;
        self.position = snapshot.position.clone();
        self.strategy.restore_range(snapshot.range());
        tracing::info!(
            equity = self.equity,
            has_position = self.position.is_some(),
            "Engine state restored from snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(h: u32, m: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar::new_unchecked(
            Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap(),
            close,
            high,
            low,
            close,
            1.0,
        )
    }

    fn engine() -> Engine {
        let mut e = Engine::new(&Config::default()).unwrap();
        e.initialize().unwrap();
        e
    }

    #[test]
    fn test_breakout_entry_then_stop_loss() {
        let mut e = engine();

        // Reference window builds a 1985-1995 range
        e.process_bar(&bar(4, 0, 1995.0, 1985.0, 1990.0)).unwrap();

        // Breakout close above the range high at the trading-window open
        let outcome = e.process_bar(&bar(13, 30, 2001.0, 1996.0, 2000.0)).unwrap();
        let opened = outcome.opened.unwrap();
        assert_eq!(opened.entry_price, 2000.0);
        assert!((opened.stop_loss - 1990.0).abs() < 1e-9);
        assert!((opened.take_profit - 2020.0).abs() < 1e-9);

        // Stop touched before target: exit at the stop price
        let outcome = e.process_bar(&bar(13, 45, 2005.0, 1989.0, 1995.0)).unwrap();
        let trade = outcome.closed.unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert!((trade.exit_price - 1990.0).abs() < 1e-9);

        // pnl = (1990 - 2000) * 100 * size
        let expected_pnl = -10.0 * 100.0 * trade.size;
        assert!((trade.pnl - expected_pnl).abs() < 1e-9);
        assert!((e.equity() - (10_000.0 + expected_pnl)).abs() < 1e-9);
    }

    #[test]
    fn test_equity_curve_one_sample_per_bar() {
        let mut e = engine();
        e.process_bar(&bar(4, 0, 2000.0, 1990.0, 1995.0)).unwrap();
        e.process_bar(&bar(8, 0, 1999.0, 1992.0, 1996.0)).unwrap();
        e.process_bar(&bar(14, 0, 1998.0, 1993.0, 1995.0)).unwrap();
        assert_eq!(e.equity_curve().len(), 3);
    }

    #[test]
    fn test_at_most_one_position() {
        let mut e = engine();
        e.process_bar(&bar(4, 0, 2000.0, 1990.0, 1995.0)).unwrap();
        e.process_bar(&bar(13, 30, 2001.0, 1996.0, 2000.5)).unwrap();
        assert!(e.position().is_some());

        // Another breakout-looking bar while a position is open: no new entry
        let outcome = e.process_bar(&bar(13, 45, 2003.0, 1999.0, 2002.0)).unwrap();
        assert!(outcome.opened.is_none());
        assert!(e.position().is_some());
    }

    #[test]
    fn test_snapshot_restore_resumes_identically() {
        let pre = vec![
            bar(4, 0, 2000.0, 1990.0, 1995.0),
            bar(13, 30, 2001.0, 1996.0, 2000.5),
        ];
        let post = vec![
            bar(13, 45, 2004.0, 1999.0, 2003.0),
            bar(14, 0, 2006.0, 2002.0, 2005.0),
            bar(14, 15, 2021.0, 2004.0, 2019.0),
        ];

        // Uninterrupted run
        let mut full = engine();
        for b in pre.iter().chain(post.iter()) {
            full.process_bar(b).unwrap();
        }

        // Interrupted run: snapshot after the prefix, restore into a fresh
        // engine, feed the suffix
        let mut first = engine();
        for b in &pre {
            first.process_bar(b).unwrap();
        }
        let snapshot = first.snapshot(Vec::new());

        let mut resumed = engine();
        resumed.restore(&snapshot).unwrap();
        for b in &post {
            resumed.process_bar(b).unwrap();
        }

        assert_eq!(full.trades().len(), resumed.trades().len());
        for (a, b) in full.trades().iter().zip(resumed.trades().iter()) {
            assert_eq!(a.exit_reason, b.exit_reason);
            assert_eq!(a.entry_price, b.entry_price);
            assert_eq!(a.exit_price, b.exit_price);
            assert_eq!(a.pnl, b.pnl);
        }
        assert_eq!(full.equity(), resumed.equity());
    }

    #[test]
    fn test_run_rejects_non_monotonic_bars() {
        let mut e = engine();
        let bars = vec![
            bar(14, 0, 2000.0, 1990.0, 1995.0),
            bar(13, 0, 2000.0, 1990.0, 1995.0),
        ];
        assert!(e.run(&bars).is_err());
    }

    #[test]
    fn test_run_rejects_empty_series() {
        let mut e = engine();
        assert!(e.run(&[]).is_err());
    }
}
