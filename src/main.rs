//! Session breakout trading system - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run the strategy over a historical bar series
//! - live: Run the polling live loop (paper mode)

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "session-breakout")]
#[command(about = "Session-range breakout strategy with backtesting and live trading", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a backtest over a historical bar series
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/xauusd_m15.json")]
        config: String,

        /// Bar data CSV (overrides the path derived from config)
        #[arg(short, long)]
        data: Option<String>,

        /// Initial equity (overrides config file)
        #[arg(long)]
        equity: Option<f64>,

        /// Label for the results directory
        #[arg(short, long, default_value = "session-breakout")]
        label: String,
    },

    /// Run live trading
    Live {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/xauusd_m15.json")]
        config: String,

        /// Bar data CSV backing the feed
        #[arg(short, long, default_value = "data/xauusd_m15.csv")]
        data: String,

        /// Paper trading mode (safe, no real money)
        #[arg(long)]
        paper: bool,

        /// Live trading mode (CAUTION - REAL MONEY!)
        #[arg(long)]
        live: bool,

        /// Poll interval in seconds
        #[arg(long, default_value = "30")]
        interval: u64,

        /// State directory for the SQLite store
        #[arg(long, default_value = "state")]
        state_dir: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Live { .. } => "live",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            data,
            equity,
            label,
        } => commands::backtest::run(config, data, equity, label),

        Commands::Live {
            config,
            data,
            paper,
            live,
            interval,
            state_dir,
        } => commands::live::run(config, data, paper, live, interval, state_dir),
    }
}
