//! RegimeBot entry point
//!
//! `regimebot backtest <bars.csv>` runs the deterministic backtester over
//! an annotated bar file and exports the trade log and equity curve.
//! `regimebot paper <bars.csv...>` runs one paper-trading step with each
//! file as an entry candidate (instrument = file stem), persisting the
//! engine state between invocations.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use regimebot::backtesting::Backtester;
use regimebot::config::AppConfig;
use regimebot::feed::{HttpPriceFeed, NoopSanityChecker};
use regimebot::paper_trading::{Candidate, PaperTradingEngine};
use regimebot::persistence::{self, StateStore};
use regimebot::risk::RiskManager;
use regimebot::strategy::StrategyEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!(digest = %config.digest(), "regimebot starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.split_first() {
        Some((cmd, rest)) if cmd == "backtest" => {
            let [bars_path] = rest else {
                bail!("usage: regimebot backtest <bars.csv>");
            };
            run_backtest(&config, bars_path)
        }
        Some((cmd, rest)) if cmd == "paper" => {
            if rest.is_empty() {
                bail!("usage: regimebot paper <bars.csv...>");
            }
            run_paper_step(&config, rest).await
        }
        _ => bail!("usage: regimebot <backtest|paper> ..."),
    }
}

fn run_backtest(config: &AppConfig, bars_path: &str) -> Result<()> {
    let bars = persistence::load_bars(bars_path)?;
    let backtester = Backtester::new(
        config.backtest_config(),
        StrategyEngine::new(config.strategy_params()),
        RiskManager::new(config.risk_config()),
    );
    let report = backtester.run(&bars)?;

    let m = &report.metrics;
    println!("=== Backtest Report ===");
    println!("Final equity:      {:.2}", m.final_equity);
    println!(
        "Total return:      {:.2}% (annualized {:.2}%)",
        m.total_return * 100.0,
        m.annualized_return * 100.0
    );
    println!("Sharpe:            {:.3}", m.sharpe_ratio);
    println!("Sortino:           {:.3}", m.sortino_ratio);
    println!("Calmar:            {:.3}", m.calmar_ratio);
    println!(
        "Max drawdown:      {:.2}% ({} bars near trough)",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    );
    println!(
        "Trades:            {} ({} wins / {} losses, win rate {:.1}%)",
        m.total_trades,
        m.winning_trades,
        m.losing_trades,
        m.win_rate * 100.0
    );
    println!("Profit factor:     {:.3}", m.profit_factor);

    let out_dir = Path::new(&config.bot.output_dir);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    persistence::export_trades(out_dir.join("backtest_trades.csv"), &report.trades)?;
    persistence::export_equity_curve(out_dir.join("backtest_equity.csv"), &report.equity_curve)?;
    Ok(())
}

async fn run_paper_step(config: &AppConfig, candidate_paths: &[String]) -> Result<()> {
    let mut candidates = Vec::with_capacity(candidate_paths.len());
    for path in candidate_paths {
        let bars = persistence::load_bars(path)?;
        let instrument = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("UNKNOWN")
            .to_string();
        candidates.push(Candidate { instrument, bars });
    }

    let feed = HttpPriceFeed::new(
        &config.feed.base_url,
        Duration::from_secs(config.feed.timeout_secs),
    )?;
    let engine = PaperTradingEngine::new(
        config.paper_config(),
        StrategyEngine::new(config.strategy_params()),
        RiskManager::new(config.risk_config()),
        StateStore::new(&config.bot.state_path),
        Box::new(feed),
        Box::new(NoopSanityChecker),
    );

    let summary = engine.run_step(&candidates).await?;
    if let Some(trade) = &summary.closed {
        println!(
            "Closed {} {} at {:.4} ({}, pnl {:.2})",
            trade.direction, trade.instrument, trade.exit_price, trade.exit_reason, trade.pnl
        );
    }
    if let Some(instrument) = &summary.entered {
        println!("Entered {}", instrument);
    }
    println!("Total equity: {:.2}", summary.total_equity);
    Ok(())
}
