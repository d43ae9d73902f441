//! Performance reporting
//!
//! Derives summary statistics from the trade list and equity curve, renders
//! the text report, and writes the run artifacts (report.txt, trades.csv,
//! performance.json) into a timestamped results directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{PerformanceMetrics, Trade};

/// Profit factor reported when there are no losing trades
const PROFIT_FACTOR_CAP: f64 = 999.0;

/// Compute summary statistics from completed trades and the equity curve
pub fn performance_metrics(
    trades: &[Trade],
    equity_curve: &[(DateTime<Utc>, f64)],
    initial_equity: f64,
) -> PerformanceMetrics {
    let final_equity = equity_curve
        .last()
        .map(|(_, e)| *e)
        .unwrap_or(initial_equity);

    let mut metrics = PerformanceMetrics {
        initial_equity,
        final_equity,
        net_profit: final_equity - initial_equity,
        return_pct: if initial_equity > 0.0 {
            (final_equity - initial_equity) / initial_equity * 100.0
        } else {
            0.0
        },
        total_trades: trades.len(),
        ..PerformanceMetrics::default()
    };

    if !trades.is_empty() {
        let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| t.pnl <= 0.0).map(|t| t.pnl).collect();

        metrics.winning_trades = wins.len();
        metrics.losing_trades = losses.len();
        metrics.win_rate = wins.len() as f64 / trades.len() as f64 * 100.0;

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|p| p.abs()).sum();

        metrics.profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            PROFIT_FACTOR_CAP
        };

        metrics.avg_win = if wins.is_empty() {
            0.0
        } else {
            gross_profit / wins.len() as f64
        };
        metrics.avg_loss = if losses.is_empty() {
            0.0
        } else {
            -gross_loss / losses.len() as f64
        };

        // SQN = sqrt(N) * mean(pnl) / std(pnl)
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
        let mean = pnls.iter().sum::<f64>() / pnls.len() as f64;
        let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / pnls.len() as f64;
        let std_dev = variance.sqrt();
        metrics.sqn = if std_dev > 0.0 {
            (pnls.len() as f64).sqrt() * mean / std_dev
        } else {
            0.0
        };
    }

    let mut peak = initial_equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;
    for (_, equity) in equity_curve {
        if *equity > peak {
            peak = *equity;
        }
        let dd = peak - equity;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            let dd_pct = dd / peak * 100.0;
            if dd_pct > max_dd_pct {
                max_dd_pct = dd_pct;
            }
        }
    }
    metrics.max_drawdown = max_dd;
    metrics.max_drawdown_pct = max_dd_pct;

    metrics
}

/// Render the text performance report
pub fn render_report(metrics: &PerformanceMetrics) -> String {
    let mut lines = Vec::new();
    lines.push("=".repeat(50));
    lines.push("        BACKTEST PERFORMANCE REPORT".to_string());
    lines.push("=".repeat(50));
    lines.push(format!("Initial Deposit:     ${:>12.2}", metrics.initial_equity));
    lines.push(format!("Final Balance:       ${:>12.2}", metrics.final_equity));
    lines.push(format!(
        "Net Profit:          ${:>12.2} ({:.2}%)",
        metrics.net_profit, metrics.return_pct
    ));
    lines.push("-".repeat(50));
    lines.push(format!("Total Trades:        {}", metrics.total_trades));
    lines.push(format!(
        "Win Rate:            {:.2}% ({} W / {} L)",
        metrics.win_rate, metrics.winning_trades, metrics.losing_trades
    ));
    lines.push(format!("Profit Factor:       {:.2}", metrics.profit_factor));
    lines.push(format!("SQN:                 {:.2}", metrics.sqn));
    lines.push(format!("Avg Win:             ${:.2}", metrics.avg_win));
    lines.push(format!("Avg Loss:            ${:.2}", metrics.avg_loss));
    lines.push("-".repeat(50));
    lines.push(format!(
        "Max Drawdown:        ${:.2} ({:.2}%)",
        metrics.max_drawdown, metrics.max_drawdown_pct
    ));
    lines.push("=".repeat(50));
    lines.join("\n")
}

/// Create `results/<timestamp>-<label>/` for this run's artifacts
pub fn create_run_dir(results_dir: impl AsRef<Path>, label: &str) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M");
    let run_dir = results_dir.as_ref().join(format!("{}-{}", stamp, label));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create results directory {}", run_dir.display()))?;
    Ok(run_dir)
}

/// Write trades.csv with the stable field order of the trade record
pub fn save_trades_csv(trades: &[Trade], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref()).context("Failed to create trades CSV")?;

    writer.write_record([
        "entry_time",
        "exit_time",
        "direction",
        "entry_price",
        "exit_price",
        "size",
        "pnl",
        "exit_reason",
        "equity_after",
    ])?;

    for trade in trades {
        writer.write_record([
            trade.entry_time.to_rfc3339(),
            trade.exit_time.to_rfc3339(),
            trade.direction.to_string(),
            format!("{:.5}", trade.entry_price),
            format!("{:.5}", trade.exit_price),
            format!("{:.2}", trade.size),
            format!("{:.2}", trade.pnl),
            trade.exit_reason.to_string(),
            format!("{:.2}", trade.equity_after),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write report.txt, trades.csv and performance.json into the run directory
pub fn save_run_artifacts(
    run_dir: impl AsRef<Path>,
    metrics: &PerformanceMetrics,
    trades: &[Trade],
) -> Result<()> {
    let run_dir = run_dir.as_ref();

    std::fs::write(run_dir.join("report.txt"), render_report(metrics))
        .context("Failed to write report.txt")?;

    save_trades_csv(trades, run_dir.join("trades.csv"))?;

    std::fs::write(
        run_dir.join("performance.json"),
        serde_json::to_string_pretty(metrics)?,
    )
    .context("Failed to write performance.json")?;

    info!("Run artifacts saved to {}", run_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, ExitReason};
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn trade(pnl: f64, equity_after: f64) -> Trade {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        Trade {
            entry_time: ts,
            exit_time: ts,
            direction: Direction::Long,
            entry_price: 2000.0,
            exit_price: 2000.0 + pnl / 10.0,
            size: 0.1,
            pnl,
            exit_reason: ExitReason::TakeProfit,
            equity_after,
        }
    }

    #[test]
    fn test_metrics_empty_trades() {
        let metrics = performance_metrics(&[], &[], 10_000.0);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.final_equity, 10_000.0);
        assert_eq!(metrics.net_profit, 0.0);
    }

    #[test]
    fn test_win_rate_and_profit_factor() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let trades = vec![trade(200.0, 10_200.0), trade(-100.0, 10_100.0)];
        let curve = vec![(ts, 10_200.0), (ts, 10_100.0)];

        let metrics = performance_metrics(&trades, &curve, 10_000.0);
        assert_relative_eq!(metrics.win_rate, 50.0);
        assert_relative_eq!(metrics.profit_factor, 2.0);
        assert_relative_eq!(metrics.avg_win, 200.0);
        assert_relative_eq!(metrics.avg_loss, -100.0);
        assert_relative_eq!(metrics.net_profit, 100.0);
    }

    #[test]
    fn test_profit_factor_capped_without_losses() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let trades = vec![trade(200.0, 10_200.0)];
        let curve = vec![(ts, 10_200.0)];
        let metrics = performance_metrics(&trades, &curve, 10_000.0);
        assert_eq!(metrics.profit_factor, PROFIT_FACTOR_CAP);
    }

    #[test]
    fn test_max_drawdown_from_peak() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        let curve = vec![
            (ts, 10_000.0),
            (ts, 11_000.0),
            (ts, 9_900.0),
            (ts, 10_500.0),
        ];
        let metrics = performance_metrics(&[], &curve, 10_000.0);
        assert_relative_eq!(metrics.max_drawdown, 1_100.0);
        assert_relative_eq!(metrics.max_drawdown_pct, 10.0);
    }

    #[test]
    fn test_trades_csv_header_order() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("session-breakout-trades-{}.csv", std::process::id()));
        save_trades_csv(&[trade(100.0, 10_100.0)], &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(
            header,
            "entry_time,exit_time,direction,entry_price,exit_price,size,pnl,exit_reason,equity_after"
        );

        std::fs::remove_file(&path).ok();
    }
}
