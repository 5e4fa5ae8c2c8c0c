//! Backtesting engine
//!
//! Deterministic fold over a validated bar series. Each bar runs the same
//! pipeline the paper trader runs live: risk exits first, then the
//! regime-dispatched strategy, with fills at the bar close. Any position
//! still open after the last bar is force-closed so the report never
//! carries unrealized PnL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::PerformanceReport;
use crate::ledger::{PositionLedger, Trade};
use crate::risk::RiskManager;
use crate::strategy::StrategyEngine;
use crate::types::{EquityPoint, ExitReason, MarketBar, TradeAction};

/// Backtest run parameters.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Starting cash
    pub initial_cash: f64,
    /// Commission per side, as a fraction of notional
    pub commission_rate: f64,
    /// Instrument label for the trade log
    pub instrument: String,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            commission_rate: 0.001,
            instrument: "SIM".to_string(),
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub metrics: PerformanceReport,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Bar-series backtester.
pub struct Backtester {
    config: BacktestConfig,
    strategy: StrategyEngine,
    risk: RiskManager,
}

impl Backtester {
    pub fn new(config: BacktestConfig, strategy: StrategyEngine, risk: RiskManager) -> Self {
        Self {
            config,
            strategy,
            risk,
        }
    }

    /// Run the full series. The series is validated up front; a single
    /// bad bar fails the whole run rather than silently skipping data.
    pub fn run(&self, bars: &[MarketBar]) -> Result<BacktestReport> {
        MarketBar::validate_series(bars).context("bar series failed validation")?;

        let lookback = self.strategy.params().lookback;
        let mut ledger = PositionLedger::new(self.config.initial_cash);
        let mut equity_curve = Vec::with_capacity(bars.len());
        let mut closes = Vec::with_capacity(bars.len());

        info!(
            bars = bars.len(),
            initial_cash = self.config.initial_cash,
            "backtest started"
        );

        for bar in bars {
            closes.push(bar.close);
            self.step(bar, &closes, lookback, &mut ledger);

            equity_curve.push(EquityPoint {
                ts: bar.ts,
                cash: ledger.cash,
                positions_value: ledger.positions_value(bar.close),
                total_equity: ledger.equity(bar.close),
            });
        }

        // Realize whatever is still open at the final close
        if let Some(last) = bars.last() {
            if !ledger.is_flat() {
                ledger.close(
                    last.close,
                    last.ts,
                    ExitReason::Forced,
                    self.config.commission_rate,
                );
                if let Some(point) = equity_curve.last_mut() {
                    point.cash = ledger.cash;
                    point.positions_value = 0.0;
                    point.total_equity = ledger.cash;
                }
            }
        }

        let metrics = PerformanceReport::from_history(&equity_curve, &ledger.trades);
        info!(
            trades = ledger.trades.len(),
            final_equity = metrics.final_equity,
            total_return = metrics.total_return,
            "backtest finished"
        );

        Ok(BacktestReport {
            metrics,
            trades: ledger.trades,
            equity_curve,
        })
    }

    /// One bar: risk exits first, then the strategy.
    fn step(&self, bar: &MarketBar, closes: &[f64], lookback: usize, ledger: &mut PositionLedger) {
        let mut risk_exited = false;
        if let Some(position) = ledger.position.as_mut() {
            if let Some(reason) = self.risk.check_exit(position, bar.close, closes, lookback) {
                ledger.close(bar.close, bar.ts, reason, self.config.commission_rate);
                risk_exited = true;
            }
        }

        let held = ledger.position.as_ref().map(|p| p.direction);
        let decision = self.strategy.decide(closes, bar, held);

        match decision.intent.action {
            TradeAction::EnterLong | TradeAction::EnterShort => {
                // Same-bar re-entry after a risk exit is not a flip;
                // fresh entries wait for the next bar.
                if risk_exited {
                    return;
                }
                // An entry against an open opposite position is a flip
                if !ledger.is_flat() {
                    ledger.close(
                        bar.close,
                        bar.ts,
                        ExitReason::Signal,
                        self.config.commission_rate,
                    );
                }
                let direction = match decision.intent.action {
                    TradeAction::EnterLong => crate::types::Direction::Long,
                    _ => crate::types::Direction::Short,
                };
                ledger.enter(
                    &self.config.instrument,
                    direction,
                    bar.close,
                    decision.intent.size,
                    bar.ts,
                    self.risk.stop_level(direction, bar.close),
                    decision.intent.take_profit,
                    decision.regime,
                    self.config.commission_rate,
                );
            }
            TradeAction::Close => {
                ledger.close(
                    bar.close,
                    bar.ts,
                    ExitReason::Signal,
                    self.config.commission_rate,
                );
            }
            TradeAction::Hold => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskConfig;
    use crate::strategy::StrategyParams;
    use crate::types::Direction;

    fn make_bar(ts: i64, close: f64, regime_score: f64, sentiment: f64) -> MarketBar {
        MarketBar {
            ts: ts * 60_000,
            open: close,
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 1_000.0,
            regime_score,
            sentiment_score: sentiment,
        }
    }

    fn make_backtester() -> Backtester {
        Backtester::new(
            BacktestConfig {
                commission_rate: 0.0,
                ..Default::default()
            },
            StrategyEngine::new(StrategyParams::default()),
            RiskManager::new(RiskConfig::default()),
        )
    }

    #[test]
    fn test_invalid_series_rejected() {
        let bt = make_backtester();
        let mut bars = vec![make_bar(1, 100.0, 0.0, 0.0), make_bar(2, 101.0, 0.0, 0.0)];
        bars[1].ts = bars[0].ts; // duplicate timestamp
        assert!(bt.run(&bars).is_err());
    }

    #[test]
    fn test_bullish_run_enters_and_force_closes() {
        let bt = make_backtester();
        // Strong bull regime, positive sentiment throughout: entry on the
        // first bar, held to the end, closed as FORCED.
        let bars: Vec<MarketBar> = (1..=10)
            .map(|i| make_bar(i, 100.0 + i as f64, 0.7, 0.4))
            .collect();
        let report = bt.run(&bars).unwrap();
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.exit_reason, ExitReason::Forced);
        assert!(trade.pnl > 0.0);
        // Final equity point carries no open position value
        assert_eq!(report.equity_curve.last().unwrap().positions_value, 0.0);
    }

    #[test]
    fn test_signal_exit_on_sentiment_collapse() {
        let bt = make_backtester();
        let mut bars: Vec<MarketBar> = (1..=5)
            .map(|i| make_bar(i, 100.0 + i as f64, 0.7, 0.4))
            .collect();
        // Sentiment collapses below the exit threshold while still bullish
        bars.push(make_bar(6, 106.0, 0.7, -0.5));
        let report = bt.run(&bars).unwrap();
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].exit_reason, ExitReason::Signal);
    }

    #[test]
    fn test_stop_loss_fires_before_strategy() {
        let bt = make_backtester();
        let mut bars = vec![make_bar(1, 100.0, 0.7, 0.4)];
        // Crash straight through the 20% stop; sentiment stays positive
        // so only the risk check can close the position.
        bars.push(make_bar(2, 79.0, 0.7, 0.4));
        bars.push(make_bar(3, 78.0, 0.0, 0.0));
        let report = bt.run(&bars).unwrap();
        assert_eq!(report.trades[0].exit_reason, ExitReason::Stop);
        // Stop exit price is the breaching bar's close
        assert!((report.trades[0].exit_price - 79.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_cover_round_trip() {
        let bt = make_backtester();
        let mut bars = vec![make_bar(1, 100.0, -0.7, -0.9)];
        bars.push(make_bar(2, 95.0, -0.7, -0.2));
        // Sentiment recovers above the cover threshold
        bars.push(make_bar(3, 93.0, -0.7, 0.5));
        let report = bt.run(&bars).unwrap();
        assert_eq!(report.trades.len(), 1);
        let trade = &report.trades[0];
        assert_eq!(trade.direction, Direction::Short);
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        assert!(trade.pnl > 0.0);
    }

    #[test]
    fn test_equity_curve_one_point_per_bar() {
        let bt = make_backtester();
        let bars: Vec<MarketBar> = (1..=25).map(|i| make_bar(i, 100.0, 0.0, 0.0)).collect();
        let report = bt.run(&bars).unwrap();
        assert_eq!(report.equity_curve.len(), 25);
        for pair in report.equity_curve.windows(2) {
            assert!(pair[1].ts > pair[0].ts);
        }
    }

    #[test]
    fn test_no_trades_preserves_cash() {
        let bt = make_backtester();
        // Bullish regime but sentiment never clears the entry threshold
        let bars: Vec<MarketBar> = (1..=8)
            .map(|i| make_bar(i, 100.0 + i as f64 * 0.1, 0.7, 0.05))
            .collect();
        let report = bt.run(&bars).unwrap();
        assert!(report.trades.is_empty());
        assert!((report.metrics.final_equity - 10_000.0).abs() < 1e-9);
    }
}
