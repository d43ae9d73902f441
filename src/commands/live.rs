//! Live trading command
//!
//! Polls the bar feed on a fixed interval, feeding each newly closed bar
//! through the simulation core. Startup recovers persisted state and replays
//! the current trading day before the first live poll.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info};

use session_breakout::data::{self, ReplayFeed};
use session_breakout::live::{LiveTrader, PaperExecutor};
use session_breakout::state::StateStore;
use session_breakout::Config;

pub fn run(
    config_path: String,
    data_path: String,
    paper: bool,
    live: bool,
    interval_secs: u64,
    state_dir: String,
) -> Result<()> {
    if !paper && !live {
        anyhow::bail!("Must specify either --paper or --live mode");
    }

    if live && paper {
        anyhow::bail!("Cannot specify both --paper and --live modes");
    }

    if live {
        anyhow::bail!("Broker order routing is not wired up; run with --paper");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, data_path, interval_secs, state_dir))
}

async fn run_async(
    config_path: String,
    data_path: String,
    interval_secs: u64,
    state_dir: String,
) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    info!("Session breakout live session, PAPER mode");
    info!("Timeframe: {}", config.strategy.timeframe);
    info!("Initial equity: {:.2}", config.trading.initial_equity);
    info!("Poll interval: {} seconds", interval_secs);

    let bars = data::load_csv(&data_path)?;
    let feed = Box::new(ReplayFeed::new(bars));
    let executor = Box::new(PaperExecutor::new());
    let store = StateStore::open_in(&state_dir)?;

    let mut trader = LiveTrader::new(&config, feed, executor, store)?;
    trader.recover()?;
    trader.replay_day(Utc::now().date_naive())?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let mut poll_interval = interval(Duration::from_secs(interval_secs));

    info!("Starting polling loop...");

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }

                if let Err(e) = trader.poll_once() {
                    error!("Poll cycle error: {:#}", e);
                    break;
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!(
        equity = trader.engine().equity(),
        trades = trader.engine().trades().len(),
        "Live session ended"
    );
    Ok(())
}
