//! Performance analytics
//!
//! Computes the standard report from an equity curve and a trade log.
//! Conventions for degenerate inputs are fixed here so both drivers agree:
//! zero return dispersion yields a 0.0 Sharpe, a profitable run with no
//! losing trades yields an infinite profit factor, a profitable run with
//! no downside returns yields a NaN Sortino, and a profitable run with no
//! drawdown yields an infinite Calmar. Callers format these as-is.

use serde::{Deserialize, Serialize};

use crate::ledger::Trade;
use crate::types::{EquityPoint, TRADING_DAYS_PER_YEAR};

/// Annual risk-free rate used for excess-return metrics.
pub const RISK_FREE_RATE: f64 = 0.02;

/// Full performance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub initial_equity: f64,
    pub final_equity: f64,
    /// (final - initial) / initial
    pub total_return: f64,
    /// Geometric annualization over the snapshot count
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Worst peak-to-trough drawdown, as a negative fraction
    pub max_drawdown: f64,
    /// Number of snapshots spent at or near the drawdown trough
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Wins / total, 0.0 with no trades
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// Gross profit / gross loss
    pub profit_factor: f64,
}

impl PerformanceReport {
    /// Build a report from snapshots and closed trades.
    ///
    /// Fewer than two snapshots produces an all-zero report with the
    /// trade statistics still filled in.
    pub fn from_history(equity_curve: &[EquityPoint], trades: &[Trade]) -> Self {
        let trade_stats = TradeStats::from_trades(trades);

        if equity_curve.len() < 2 {
            let equity = equity_curve
                .first()
                .map(|p| p.total_equity)
                .unwrap_or(0.0);
            return Self {
                initial_equity: equity,
                final_equity: equity,
                total_return: 0.0,
                annualized_return: 0.0,
                sharpe_ratio: 0.0,
                sortino_ratio: 0.0,
                calmar_ratio: 0.0,
                max_drawdown: 0.0,
                max_drawdown_duration: 0,
                ..trade_stats.into_report()
            };
        }

        let equities: Vec<f64> = equity_curve.iter().map(|p| p.total_equity).collect();
        let initial_equity = equities[0];
        let final_equity = equities[equities.len() - 1];
        let total_return = (final_equity - initial_equity) / initial_equity;

        let periods = (equities.len() - 1) as f64;
        let annualized_return =
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / periods) - 1.0;

        let returns: Vec<f64> = equities
            .windows(2)
            .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
            .collect();

        let (max_drawdown, max_drawdown_duration) = drawdown_profile(&equities);
        let calmar_ratio = if max_drawdown < 0.0 {
            annualized_return / max_drawdown.abs()
        } else if annualized_return > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            initial_equity,
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio: sharpe_ratio(&returns),
            sortino_ratio: sortino_ratio(&returns),
            calmar_ratio,
            max_drawdown,
            max_drawdown_duration,
            ..trade_stats.into_report()
        }
    }
}

/// Annualized Sharpe ratio over per-period returns. 0.0 when the return
/// dispersion is zero.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let rf_per_period = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
    let mean = excess.iter().sum::<f64>() / excess.len() as f64;
    let variance =
        excess.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / excess.len() as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    mean / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio: like Sharpe but penalizing only downside
/// deviation, measured as the sample stdev of the negative excess
/// returns. NaN when no period had a negative excess return (profitable
/// history) or when a single downside return leaves the stdev undefined.
pub fn sortino_ratio(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let rf_per_period = RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
    let mean = excess.iter().sum::<f64>() / excess.len() as f64;

    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        // All-upside history: undefined when profitable, zero otherwise
        return if mean > 0.0 { f64::NAN } else { 0.0 };
    }
    if downside.len() < 2 {
        // Sample stdev of one observation is undefined
        return f64::NAN;
    }
    let downside_mean = downside.iter().sum::<f64>() / downside.len() as f64;
    let downside_var = downside
        .iter()
        .map(|r| (r - downside_mean).powi(2))
        .sum::<f64>()
        / (downside.len() - 1) as f64;
    let downside_std = downside_var.sqrt();
    if downside_std == 0.0 {
        return if mean > 0.0 { f64::NAN } else { 0.0 };
    }
    mean / downside_std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Worst drawdown and the number of snapshots spent near the trough.
///
/// Duration counts points whose drawdown is within 1% of the trough
/// magnitude, so a single crash followed by a long flat bottom reports a
/// long duration while a V-shaped dip reports a short one.
fn drawdown_profile(equities: &[f64]) -> (f64, usize) {
    let mut peak = f64::NEG_INFINITY;
    let mut drawdowns = Vec::with_capacity(equities.len());
    let mut max_dd = 0.0_f64;

    for &equity in equities {
        peak = peak.max(equity);
        let dd = if peak > 0.0 { (equity - peak) / peak } else { 0.0 };
        drawdowns.push(dd);
        max_dd = max_dd.min(dd);
    }

    if max_dd == 0.0 {
        return (0.0, 0);
    }

    let near_trough = max_dd * 0.99;
    let duration = drawdowns.iter().filter(|dd| **dd <= near_trough).count();
    (max_dd, duration)
}

struct TradeStats {
    total_trades: usize,
    winning_trades: usize,
    losing_trades: usize,
    win_rate: f64,
    avg_win: f64,
    avg_loss: f64,
    profit_factor: f64,
}

impl TradeStats {
    fn from_trades(trades: &[Trade]) -> Self {
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: if trades.is_empty() {
                0.0
            } else {
                wins.len() as f64 / trades.len() as f64
            },
            avg_win: if wins.is_empty() {
                0.0
            } else {
                gross_profit / wins.len() as f64
            },
            avg_loss: if losses.is_empty() {
                0.0
            } else {
                losses.iter().sum::<f64>() / losses.len() as f64
            },
            profit_factor,
        }
    }

    fn into_report(self) -> PerformanceReport {
        PerformanceReport {
            initial_equity: 0.0,
            final_equity: 0.0,
            total_return: 0.0,
            annualized_return: 0.0,
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            calmar_ratio: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration: 0,
            total_trades: self.total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            win_rate: self.win_rate,
            avg_win: self.avg_win,
            avg_loss: self.avg_loss,
            profit_factor: self.profit_factor,
        }
    }
}
