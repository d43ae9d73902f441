//! Configuration management
//!
//! Loads and validates the JSON configuration file. Every window string and
//! numeric parameter is checked at load time so a malformed configuration
//! fails before any bar is processed, never mid-run.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::session::SessionWindow;

/// Configuration errors surfaced at strategy initialization
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid time-of-day '{value}' for {field}: expected HH:MM")]
    InvalidTimeOfDay { field: &'static str, value: String },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("risk_pct must be in (0, 1], got {0}")]
    RiskPctOutOfRange(f64),
}

/// Parse a wall-clock "HH:MM" string
pub fn parse_time_of_day(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| ConfigError::InvalidTimeOfDay {
        field,
        value: value.to_string(),
    })
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            sessions: SessionsConfig::default(),
            sizing: SizingConfig::default(),
            trading: TradingConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, failing fast on any invalid value
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sessions.reference_window()?;
        self.sessions.trading_window()?;
        self.strategy.validate()?;
        self.sizing.validate()?;
        if self.trading.initial_equity <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "initial_equity",
                value: self.trading.initial_equity,
            });
        }
        Ok(())
    }
}

/// Strategy parameters, in pip units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Timeframe label, used for data file naming and logging
    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    /// Take-profit distance in pips
    #[serde(default = "default_tp_pips")]
    pub tp_pips: f64,

    /// Stop-loss distance in pips
    #[serde(default = "default_sl_pips")]
    pub sl_pips: f64,

    /// Favorable excursion (in pips) before the trailing stop activates
    #[serde(default = "default_trail_trigger_pips")]
    pub trail_trigger_pips: f64,

    /// Trailing distance in pips behind the peak price
    #[serde(default = "default_trail_distance_pips")]
    pub trail_distance_pips: f64,

    /// Price units per pip (0.10 for the reference instrument)
    #[serde(default = "default_pip_value")]
    pub pip_value: f64,

    /// Currency units of profit per unit size per unit price move
    #[serde(default = "default_contract_multiplier")]
    pub contract_multiplier: f64,
}

fn default_timeframe() -> String {
    "M15".to_string()
}
fn default_tp_pips() -> f64 {
    200.0
}
fn default_sl_pips() -> f64 {
    100.0
}
fn default_trail_trigger_pips() -> f64 {
    20.0
}
fn default_trail_distance_pips() -> f64 {
    5.0
}
fn default_pip_value() -> f64 {
    0.10
}
fn default_contract_multiplier() -> f64 {
    100.0
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            tp_pips: default_tp_pips(),
            sl_pips: default_sl_pips(),
            trail_trigger_pips: default_trail_trigger_pips(),
            trail_distance_pips: default_trail_distance_pips(),
            pip_value: default_pip_value(),
            contract_multiplier: default_contract_multiplier(),
        }
    }
}

impl StrategyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("tp_pips", self.tp_pips),
            ("sl_pips", self.sl_pips),
            ("pip_value", self.pip_value),
            ("contract_multiplier", self.contract_multiplier),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        Ok(())
    }

    /// Stop-loss distance in price units
    pub fn sl_distance(&self) -> f64 {
        self.sl_pips * self.pip_value
    }

    /// Take-profit distance in price units
    pub fn tp_distance(&self) -> f64 {
        self.tp_pips * self.pip_value
    }

    /// Trailing trigger distance in price units
    pub fn trail_trigger_distance(&self) -> f64 {
        self.trail_trigger_pips * self.pip_value
    }

    /// Trailing stop distance in price units
    pub fn trail_distance(&self) -> f64 {
        self.trail_distance_pips * self.pip_value
    }
}

/// Session window configuration, wall-clock "HH:MM" strings
///
/// The trading window starts where the reference window ends, so by
/// construction the two windows never overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_reference_start")]
    pub reference_start: String,
    #[serde(default = "default_reference_end")]
    pub reference_end: String,
    #[serde(default = "default_trading_end")]
    pub trading_end: String,
}

fn default_reference_start() -> String {
    "03:30".to_string()
}
fn default_reference_end() -> String {
    "13:30".to_string()
}
fn default_trading_end() -> String {
    "21:30".to_string()
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            reference_start: default_reference_start(),
            reference_end: default_reference_end(),
            trading_end: default_trading_end(),
        }
    }
}

impl SessionsConfig {
    /// The range-building ("Asian") window
    pub fn reference_window(&self) -> Result<SessionWindow, ConfigError> {
        Ok(SessionWindow::new(
            parse_time_of_day("reference_start", &self.reference_start)?,
            parse_time_of_day("reference_end", &self.reference_end)?,
        ))
    }

    /// The entry window, from the reference end to the trading end
    pub fn trading_window(&self) -> Result<SessionWindow, ConfigError> {
        Ok(SessionWindow::new(
            parse_time_of_day("reference_end", &self.reference_end)?,
            parse_time_of_day("trading_end", &self.trading_end)?,
        ))
    }
}

/// Position sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// Always trade the configured fixed size
    Fixed,
    /// Risk a fixed percentage of current equity per trade
    RiskPct,
}

/// Position sizing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_sizing_mode")]
    pub mode: SizingMode,
    #[serde(default = "default_fixed_size")]
    pub fixed_size: f64,
    /// Fraction of equity risked per trade (0.01 = 1%)
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,
}

fn default_sizing_mode() -> SizingMode {
    SizingMode::RiskPct
}
fn default_fixed_size() -> f64 {
    0.01
}
fn default_risk_pct() -> f64 {
    0.01
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: default_sizing_mode(),
            fixed_size: default_fixed_size(),
            risk_pct: default_risk_pct(),
        }
    }
}

impl SizingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_size <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "fixed_size",
                value: self.fixed_size,
            });
        }
        if self.risk_pct <= 0.0 || self.risk_pct > 1.0 {
            return Err(ConfigError::RiskPctOutOfRange(self.risk_pct));
        }
        Ok(())
    }
}

/// Trading account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_initial_equity")]
    pub initial_equity: f64,
}

fn default_initial_equity() -> f64 {
    10_000.0
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_equity: default_initial_equity(),
        }
    }
}

/// Backtest I/O configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}
fn default_results_dir() -> String {
    "results".to_string()
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
        }
    }
}
