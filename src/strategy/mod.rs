//! Adaptive strategy
//!
//! Regime-dispatched decision engine: the macro regime score selects one
//! of three mode executors, and the volatility adapter scales the
//! thresholds that executor compares against. All parameters come from an
//! immutable [`StrategyParams`] fixed at construction.

mod modes;
mod thresholds;

pub use modes::{
    Aggressive, DecisionContext, Defensive, MeanReversion, ModeExecutor, MAX_POSITION_FRACTION,
};
pub use thresholds::ThresholdAdapter;

use tracing::debug;

use crate::features;
use crate::types::{Direction, MarketBar, Regime, ThresholdSet, TradeIntent};

/// Strategy parameters, fixed at engine construction.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    /// Lookback for volatility and support/resistance (bars)
    pub lookback: usize,
    /// Band buffer for support/resistance and entry proximity
    pub band_buffer: f64,
    /// Aggressive-mode base size (fraction of equity)
    pub aggressive_size: f64,
    /// Defensive-mode base size
    pub defensive_size: f64,
    /// Mean-reversion base size
    pub mean_reversion_size: f64,
    /// Minimum profit a mean-reversion midpoint target must offer
    pub min_target_pct: f64,
    /// Fixed mean-reversion target when both band targets degenerate
    pub fallback_target_pct: f64,
    /// Adapt thresholds to volatility (false = static thresholds)
    pub use_dynamic_thresholds: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            lookback: 20,
            band_buffer: 0.03,
            aggressive_size: 0.95,
            defensive_size: 0.5,
            mean_reversion_size: 0.6,
            min_target_pct: 0.005,
            fallback_target_pct: 0.05,
            use_dynamic_thresholds: true,
        }
    }
}

/// The decision produced for one bar, with the inputs that drove it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub regime: Regime,
    pub volatility: f64,
    pub thresholds: ThresholdSet,
    pub intent: TradeIntent,
}

/// Regime-dispatched decision engine.
///
/// Shared unchanged between the backtest and paper-trading drivers; the
/// engine sees only price history and the current bar, never the ledger.
pub struct StrategyEngine {
    params: StrategyParams,
    adapter: ThresholdAdapter,
    aggressive: Aggressive,
    defensive: Defensive,
    mean_reversion: MeanReversion,
}

impl StrategyEngine {
    pub fn new(params: StrategyParams) -> Self {
        let adapter = ThresholdAdapter {
            use_dynamic: params.use_dynamic_thresholds,
            ..Default::default()
        };
        let aggressive = Aggressive {
            base_size: params.aggressive_size,
        };
        let defensive = Defensive {
            base_size: params.defensive_size,
        };
        let mean_reversion = MeanReversion {
            base_size: params.mean_reversion_size,
            band_buffer: params.band_buffer,
            min_target_pct: params.min_target_pct,
            fallback_target_pct: params.fallback_target_pct,
        };
        Self {
            params,
            adapter,
            aggressive,
            defensive,
            mean_reversion,
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// The executor for a regime.
    fn executor(&self, regime: Regime) -> &dyn ModeExecutor {
        match regime {
            Regime::Bullish => &self.aggressive,
            Regime::Bearish => &self.defensive,
            Regime::Sideways => &self.mean_reversion,
        }
    }

    /// Decide on the latest bar.
    ///
    /// `closes` is the close history up to and including `bar`; only the
    /// latest bar's scores are read (never future bars). With fewer than
    /// two closes there is no band to trade against and the engine holds.
    pub fn decide(
        &self,
        closes: &[f64],
        bar: &MarketBar,
        position: Option<Direction>,
    ) -> Decision {
        let regime = Regime::classify(bar.regime_score);
        let volatility = features::annualized_volatility(closes, self.params.lookback);
        let thresholds = self.adapter.select(volatility);

        if closes.is_empty() {
            return Decision {
                regime,
                volatility,
                thresholds,
                intent: TradeIntent::hold(),
            };
        }

        let (support, resistance) =
            features::support_resistance(closes, self.params.lookback, self.params.band_buffer);
        let ctx = DecisionContext {
            price: bar.close,
            sentiment: bar.sentiment_score,
            thresholds,
            support: support[support.len() - 1],
            resistance: resistance[resistance.len() - 1],
            position,
        };

        let executor = self.executor(regime);
        let intent = executor.evaluate(&ctx);
        debug!(
            regime = %regime,
            mode = executor.name(),
            volatility,
            action = %intent.action,
            "decision"
        );

        Decision {
            regime,
            volatility,
            thresholds,
            intent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeAction;

    fn make_bar(ts: i64, close: f64, regime_score: f64, sentiment: f64) -> MarketBar {
        MarketBar {
            ts,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1000.0,
            regime_score,
            sentiment_score: sentiment,
        }
    }

    #[test]
    fn test_bullish_regime_dispatches_aggressive() {
        let engine = StrategyEngine::new(StrategyParams::default());
        // Short history: volatility falls back to 0.20 (medium bucket,
        // entry threshold 0.1), sentiment 0.3 clears it.
        let closes = vec![100.0, 101.0, 100.5];
        let bar = make_bar(3, 100.5, 0.6, 0.3);
        let decision = engine.decide(&closes, &bar, None);
        assert_eq!(decision.regime, Regime::Bullish);
        assert_eq!(decision.intent.action, TradeAction::EnterLong);
    }

    #[test]
    fn test_bearish_regime_dispatches_defensive() {
        let engine = StrategyEngine::new(StrategyParams::default());
        let closes = vec![100.0, 99.0, 98.0];
        let bar = make_bar(3, 98.0, -0.6, -0.9);
        let decision = engine.decide(&closes, &bar, None);
        assert_eq!(decision.regime, Regime::Bearish);
        assert_eq!(decision.intent.action, TradeAction::EnterShort);
    }

    #[test]
    fn test_sideways_regime_dispatches_mean_reversion() {
        let engine = StrategyEngine::new(StrategyParams::default());
        // Flat-ish channel; last close sits on the lows, near the support band.
        let closes = vec![100.0, 104.0, 103.0, 100.5, 100.2];
        let bar = make_bar(5, 100.2, 0.0, 0.0);
        let decision = engine.decide(&closes, &bar, None);
        assert_eq!(decision.regime, Regime::Sideways);
        assert_eq!(decision.intent.action, TradeAction::EnterLong);
        assert!(decision.intent.take_profit.is_some());
    }

    #[test]
    fn test_empty_history_holds() {
        let engine = StrategyEngine::new(StrategyParams::default());
        let bar = make_bar(1, 100.0, 0.6, 0.9);
        let decision = engine.decide(&[], &bar, None);
        assert_eq!(decision.intent.action, TradeAction::Hold);
    }

    #[test]
    fn test_volatility_scales_entry_size() {
        let engine = StrategyEngine::new(StrategyParams::default());
        // Build a violently swinging series so volatility lands in the
        // extreme bucket (multiplier 0.5).
        let mut closes = vec![100.0];
        for i in 0..25 {
            let last = *closes.last().unwrap();
            let ret = if i % 2 == 0 { 0.08 } else { -0.07 };
            closes.push(last * (1.0 + ret));
        }
        let last = *closes.last().unwrap();
        let bar = make_bar(26, last, 0.6, 0.5);
        let decision = engine.decide(&closes, &bar, None);
        assert!(decision.volatility >= 0.80, "vol = {}", decision.volatility);
        assert_eq!(decision.intent.action, TradeAction::EnterLong);
        assert!((decision.intent.size - 0.95 * 0.5).abs() < 1e-9);
    }
}
