//! Backtest command implementation

use anyhow::Result;
use session_breakout::engine::Engine;
use session_breakout::{data, report, Config};
use tracing::info;

pub fn run(
    config_path: String,
    data_override: Option<String>,
    equity_override: Option<f64>,
    label: String,
) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(equity) = equity_override {
        info!("Overriding initial equity to: {:.2}", equity);
        config.trading.initial_equity = equity;
    }

    let data_path = data_override.unwrap_or_else(|| {
        format!(
            "{}/xauusd_{}.csv",
            config.backtest.data_dir,
            config.strategy.timeframe.to_lowercase()
        )
    });

    info!("Loading bars from: {}", data_path);
    let bars = data::load_csv(&data_path)?;
    info!("Loaded {} bars", bars.len());

    let mut engine = Engine::new(&config)?;
    let result = engine.run(&bars)?;

    println!("{}", report::render_report(&result.metrics));

    let run_dir = report::create_run_dir(&config.backtest.results_dir, &label)?;
    report::save_run_artifacts(&run_dir, &result.metrics, &result.trades)?;

    Ok(())
}
