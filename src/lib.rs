//! Session Breakout Trading System
//!
//! A session-range breakout strategy for metals CFDs, with a deterministic
//! backtest engine, persistent state for crash recovery, and a polling live
//! trading loop.

pub mod config;
pub mod data;
pub mod engine;
pub mod live;
pub mod position;
pub mod range;
pub mod report;
pub mod session;
pub mod sizing;
pub mod state;
pub mod strategy;
pub mod types;

pub use config::Config;
pub use session::SessionWindow;
pub use types::*;
