//! Intra-trade position management
//!
//! Evaluates the open position against each bar in a fixed priority order:
//! stop-loss, take-profit, session close, then trailing-stop maintenance.
//! Stop-loss outranks take-profit because a single bar's intrabar path is
//! unknown, so the worse-case ordering is assumed.

use crate::state::StateError;
use crate::{Bar, Direction, ExitReason, Position, SessionWindow};

/// Exit decision produced for the current bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionExit {
    pub price: f64,
    pub reason: ExitReason,
}

/// Evaluates stop/target/session-close and maintains the trailing stop
#[derive(Debug, Clone)]
pub struct PositionManager {
    trading_window: SessionWindow,
    trail_trigger: f64,
    trail_distance: f64,
}

impl PositionManager {
    /// `trail_trigger` and `trail_distance` are in price units
    pub fn new(trading_window: SessionWindow, trail_trigger: f64, trail_distance: f64) -> Self {
        Self {
            trading_window,
            trail_trigger,
            trail_distance,
        }
    }

    /// Run one bar through the exit checks, mutating the trailing stop when
    /// no exit fires.
    ///
    /// A position with a non-finite stop or target can only come from a
    /// tampered snapshot; that is treated as state corruption and aborts the
    /// run rather than being silently tolerated.
    pub fn manage(
        &self,
        position: &mut Position,
        bar: &Bar,
    ) -> Result<Option<PositionExit>, StateError> {
        if !position.stop_loss.is_finite()
            || !position.take_profit.is_finite()
            || !position.size.is_finite()
            || position.size <= 0.0
        {
            return Err(StateError::CorruptPosition {
                stop_loss: position.stop_loss,
                take_profit: position.take_profit,
                size: position.size,
            });
        }

        let stop_hit = match position.direction {
            Direction::Long => bar.low <= position.stop_loss,
            Direction::Short => bar.high >= position.stop_loss,
        };
        if stop_hit {
            return Ok(Some(PositionExit {
                price: position.stop_loss,
                reason: ExitReason::StopLoss,
            }));
        }

        let target_hit = match position.direction {
            Direction::Long => bar.high >= position.take_profit,
            Direction::Short => bar.low <= position.take_profit,
        };
        if target_hit {
            return Ok(Some(PositionExit {
                price: position.take_profit,
                reason: ExitReason::TakeProfit,
            }));
        }

        if !self.trading_window.contains(bar.timestamp.time()) {
            return Ok(Some(PositionExit {
                price: bar.close,
                reason: ExitReason::SessionClose,
            }));
        }

        self.update_trailing_stop(position, bar);
        Ok(None)
    }

    /// Canonical peak-tracking rule: the peak updates on every favorable
    /// extreme; once it has moved past entry by the trigger distance, the
    /// candidate stop trails the peak and is adopted only when it tightens.
    fn update_trailing_stop(&self, position: &mut Position, bar: &Bar) {
        match position.direction {
            Direction::Long => {
                if bar.high > position.peak_price {
                    position.peak_price = bar.high;
                }
                if position.peak_price >= position.entry_price + self.trail_trigger {
                    let candidate = position.peak_price - self.trail_distance;
                    if candidate > position.stop_loss {
                        tracing::debug!(
                            old_stop = position.stop_loss,
                            new_stop = candidate,
                            "Trailing stop raised"
                        );
                        position.stop_loss = candidate;
                    }
                }
            }
            Direction::Short => {
                if bar.low < position.peak_price {
                    position.peak_price = bar.low;
                }
                if position.peak_price <= position.entry_price - self.trail_trigger {
                    let candidate = position.peak_price + self.trail_distance;
                    if candidate < position.stop_loss {
                        tracing::debug!(
                            old_stop = position.stop_loss,
                            new_stop = candidate,
                            "Trailing stop lowered"
                        );
                        position.stop_loss = candidate;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveTime, TimeZone, Utc};

    fn trading_window() -> SessionWindow {
        SessionWindow::new(
            NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(21, 30, 0).unwrap(),
        )
    }

    fn manager() -> PositionManager {
        // Trigger 2.0, distance 0.5 in price units
        PositionManager::new(trading_window(), 2.0, 0.5)
    }

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn bar(h: u32, m: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar::new_unchecked(ts(h, m), close, high, low, close, 1.0)
    }

    fn long() -> Position {
        Position::open(Direction::Long, ts(14, 0), 2000.0, 1990.0, 2020.0, 0.1)
    }

    fn short() -> Position {
        Position::open(Direction::Short, ts(14, 0), 2000.0, 2010.0, 1980.0, 0.1)
    }

    #[test]
    fn test_long_stop_loss_at_stop_price() {
        let mut pos = long();
        let exit = manager()
            .manage(&mut pos, &bar(14, 15, 2005.0, 1989.0, 1995.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.price, 1990.0);
    }

    #[test]
    fn test_long_take_profit_at_target_price() {
        let mut pos = long();
        let exit = manager()
            .manage(&mut pos, &bar(14, 15, 2021.0, 2005.0, 2018.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.price, 2020.0);
    }

    #[test]
    fn test_stop_wins_when_both_touchable() {
        // Bar range covers both stop and target on the same bar
        let mut pos = long();
        let exit = manager()
            .manage(&mut pos, &bar(14, 15, 2025.0, 1985.0, 2000.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_short_stop_and_target() {
        let mut pos = short();
        let exit = manager()
            .manage(&mut pos, &bar(14, 15, 2011.0, 2000.0, 2005.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.price, 2010.0);

        let mut pos = short();
        let exit = manager()
            .manage(&mut pos, &bar(14, 15, 1995.0, 1979.0, 1985.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.price, 1980.0);
    }

    #[test]
    fn test_session_close_outside_trading_window() {
        let mut pos = long();
        let exit = manager()
            .manage(&mut pos, &bar(21, 30, 2005.0, 1998.0, 2003.0))
            .unwrap()
            .unwrap();
        assert_eq!(exit.reason, ExitReason::SessionClose);
        assert_eq!(exit.price, 2003.0);
    }

    #[test]
    fn test_trailing_activates_past_trigger_and_tightens_only() {
        let mut pos = long();
        let mgr = manager();

        // Below trigger: peak moves but stop stays
        assert!(mgr
            .manage(&mut pos, &bar(14, 15, 2001.0, 1999.0, 2000.5))
            .unwrap()
            .is_none());
        assert_eq!(pos.peak_price, 2001.0);
        assert_eq!(pos.stop_loss, 1990.0);

        // Past trigger (entry + 2.0): trail to peak - 0.5
        assert!(mgr
            .manage(&mut pos, &bar(14, 30, 2003.0, 2000.0, 2002.0))
            .unwrap()
            .is_none());
        assert_eq!(pos.peak_price, 2003.0);
        assert_eq!(pos.stop_loss, 2002.5);

        // Pullback: peak and stop both hold
        assert!(mgr
            .manage(&mut pos, &bar(14, 45, 2002.9, 2002.6, 2002.7))
            .unwrap()
            .is_none());
        assert_eq!(pos.peak_price, 2003.0);
        assert_eq!(pos.stop_loss, 2002.5);
    }

    #[test]
    fn test_trailing_never_loosens_short() {
        let mut pos = short();
        let mgr = manager();

        // Favorable move past trigger: stop comes down to peak + 0.5
        assert!(mgr
            .manage(&mut pos, &bar(14, 15, 1999.0, 1997.0, 1998.0))
            .unwrap()
            .is_none());
        let stop_after_first = pos.stop_loss;
        assert_eq!(stop_after_first, 1997.5);

        // Adverse bar that triggers nothing: stop must not rise
        assert!(mgr
            .manage(&mut pos, &bar(14, 30, 1997.4, 1997.0, 1997.2))
            .unwrap()
            .is_none());
        assert!(pos.stop_loss <= stop_after_first);
    }

    #[test]
    fn test_corrupt_position_is_fatal() {
        let mut pos = long();
        pos.stop_loss = f64::NAN;
        let err = manager()
            .manage(&mut pos, &bar(14, 15, 2005.0, 1995.0, 2000.0))
            .unwrap_err();
        assert!(matches!(err, StateError::CorruptPosition { .. }));
    }
}
