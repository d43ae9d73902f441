//! Trading strategy framework
//!
//! Defines the Strategy trait and implements the session-range breakout
//! strategy: build a high/low range during the reference window, then enter
//! on a close beyond either extreme during the trading window.

use anyhow::Result;

use crate::config::Config;
use crate::range::RangeTracker;
use crate::session::SessionWindow;
use crate::{Bar, Direction, Position, Signal};

/// Trading strategy trait
///
/// Implementations are plain per-bar state machines: `initialize` is called
/// once before the first bar, `on_bar` once per bar in input order. At most
/// one signal is emitted per bar.
pub trait Strategy: Send {
    /// Called once before the first bar
    fn initialize(&mut self) -> Result<()>;

    /// Consume one bar and emit at most one signal
    fn on_bar(&mut self, bar: &Bar, position: Option<&Position>) -> Option<Signal>;
}

/// Session-range breakout strategy
pub struct BreakoutStrategy {
    reference_window: SessionWindow,
    trading_window: SessionWindow,
    sl_distance: f64,
    tp_distance: f64,
    range: RangeTracker,
}

impl BreakoutStrategy {
    /// Build from a validated configuration. Window parsing fails here if the
    /// configuration skipped validation.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            reference_window: config.sessions.reference_window()?,
            trading_window: config.sessions.trading_window()?,
            sl_distance: config.strategy.sl_distance(),
            tp_distance: config.strategy.tp_distance(),
            range: RangeTracker::new(),
        })
    }

    pub fn range(&self) -> &RangeTracker {
        &self.range
    }

    /// Restore the range accumulator from a snapshot
    pub fn restore_range(&mut self, range: RangeTracker) {
        self.range = range;
    }

    fn entry_signal(&self, bar: &Bar) -> Option<Signal> {
        if bar.close > self.range.high {
            // Long breakout takes priority; the accumulated high is >= the
            // accumulated low by construction, so both legs cannot fire.
            return Some(Signal::Entry {
                direction: Direction::Long,
                price: bar.close,
                stop_loss: bar.close - self.sl_distance,
                take_profit: bar.close + self.tp_distance,
            });
        }
        if bar.close < self.range.low {
            return Some(Signal::Entry {
                direction: Direction::Short,
                price: bar.close,
                stop_loss: bar.close + self.sl_distance,
                take_profit: bar.close - self.tp_distance,
            });
        }
        None
    }
}

impl Strategy for BreakoutStrategy {
    fn initialize(&mut self) -> Result<()> {
        tracing::info!(
            reference = %self.reference_window,
            trading = %self.trading_window,
            "Breakout strategy initialized"
        );
        self.range.reset();
        Ok(())
    }

    fn on_bar(&mut self, bar: &Bar, position: Option<&Position>) -> Option<Signal> {
        let time = bar.timestamp.time();

        self.range.observe(bar, &self.reference_window);

        let in_reference = self.reference_window.contains(time);
        let in_trading = self.trading_window.contains(time);

        // Outside both windows the session cycle is over; drop the range so
        // the next reference window starts fresh. The reset is suppressed
        // while a position is open so the originating range survives until
        // the trade resolves.
        if !in_reference && !in_trading {
            if position.is_none() && self.range.is_ready() {
                tracing::debug!("Session cycle complete, resetting range");
                self.range.reset();
            }
            return None;
        }

        // One position at a time: no entry evaluation while a trade is open.
        if position.is_some() {
            return None;
        }

        if in_trading && self.range.is_ready() {
            let signal = self.entry_signal(bar);
            if let Some(Signal::Entry {
                direction, price, ..
            }) = &signal
            {
                tracing::info!(
                    %direction,
                    price,
                    range_high = self.range.high,
                    range_low = self.range.low,
                    "Breakout entry signal"
                );
            }
            return signal;
        }

        None
    }
}
