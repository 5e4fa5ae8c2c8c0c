//! Rolling market features
//!
//! Volatility, support/resistance bands and trend strength computed from
//! close-price history. All functions use only data at or before the
//! current bar; nothing here may peek ahead in the series.

/// Fallback annualized volatility when history is too short.
///
/// Downstream consumers must never receive "no data" as a silent zero:
/// a zero volatility would select the most aggressive threshold bucket.
pub const DEFAULT_VOLATILITY: f64 = 0.20;

use crate::types::TRADING_DAYS_PER_YEAR;

/// Annualized volatility from the last `period` simple returns.
///
/// stdev(returns) * sqrt(252). Returns [`DEFAULT_VOLATILITY`] when fewer
/// than `period + 1` closes are available.
pub fn annualized_volatility(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return DEFAULT_VOLATILITY;
    }

    let window = &closes[closes.len() - (period + 1)..];
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.is_empty() {
        return DEFAULT_VOLATILITY;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;

    variance.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Rolling support/resistance bands.
///
/// support[i] = min(closes over the last `period` bars ending at i) * (1 + buffer)
/// resistance[i] = max(...) * (1 - buffer)
///
/// The window expands from one bar at the start of the series (the
/// equivalent of min_periods=1): early values are based on whatever past
/// data exists, never on future bars.
pub fn support_resistance(closes: &[f64], period: usize, buffer: f64) -> (Vec<f64>, Vec<f64>) {
    let mut support = Vec::with_capacity(closes.len());
    let mut resistance = Vec::with_capacity(closes.len());

    for i in 0..closes.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &closes[start..=i];
        let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        support.push(min * (1.0 + buffer));
        resistance.push(max * (1.0 - buffer));
    }

    (support, resistance)
}

/// Directional trend strength over the last `period` bars.
///
/// |period return| normalized by the volatility expected over the same
/// horizon, so ~1.0 marks a move one annualized-sigma beyond normal.
/// Returns 0.0 with insufficient history (reads as "no strong trend").
pub fn trend_strength(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 {
        return 0.0;
    }

    let last = closes[closes.len() - 1];
    let past = closes[closes.len() - 1 - period];
    if past == 0.0 {
        return 0.0;
    }
    let period_return = (last - past) / past;

    let vol = annualized_volatility(closes, period);
    let horizon_vol = vol * (period as f64 / TRADING_DAYS_PER_YEAR).sqrt();
    if horizon_vol == 0.0 {
        return 0.0;
    }

    (period_return / horizon_vol).abs()
}
