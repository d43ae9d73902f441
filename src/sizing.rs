//! Position sizing
//!
//! Converts a requested stop distance and current equity into a trade size
//! under either a fixed-size or an equity-risk-percentage policy.

use crate::config::{SizingConfig, SizingMode};

/// Smallest tradable size
pub const MIN_SIZE: f64 = 0.01;

/// Floor substituted for a zero stop distance. Entry signals always carry a
/// stop one sl-distance away, so this guard only fires on tampered input.
const MIN_STOP_DISTANCE: f64 = 1e-9;

/// Position sizer selected by configuration
#[derive(Debug, Clone)]
pub struct PositionSizer {
    mode: SizingMode,
    fixed_size: f64,
    risk_pct: f64,
    contract_multiplier: f64,
}

impl PositionSizer {
    pub fn new(config: &SizingConfig, contract_multiplier: f64) -> Self {
        Self {
            mode: config.mode,
            fixed_size: config.fixed_size,
            risk_pct: config.risk_pct,
            contract_multiplier,
        }
    }

    /// Compute the trade size for the given equity and stop distance
    /// (price units)
    pub fn size_for(&self, equity: f64, stop_distance: f64) -> f64 {
        match self.mode {
            SizingMode::Fixed => self.fixed_size,
            SizingMode::RiskPct => {
                let stop_distance = if stop_distance == 0.0 {
                    tracing::warn!("Zero stop distance in sizing, substituting minimum");
                    MIN_STOP_DISTANCE
                } else {
                    stop_distance.abs()
                };

                let risk_amount = equity * self.risk_pct;
                let size = risk_amount / (stop_distance * self.contract_multiplier);
                let size = (size * 100.0).round() / 100.0;
                size.max(MIN_SIZE)
            }
        }
    }
}
