//! Mode executors
//!
//! Three rule sets, one per regime. Exactly one executor runs per bar and
//! each emits at most one action. Entry/exit conditions are strict
//! numerical comparisons against the per-bar threshold set; there is no
//! discretionary path.

use tracing::debug;

use crate::types::{Direction, ThresholdSet, TradeAction, TradeIntent};

/// Hard ceiling on any entry size, as a fraction of equity.
pub const MAX_POSITION_FRACTION: f64 = 0.95;

/// Everything an executor may look at for one bar.
///
/// Executors see the current position only as its direction; they never
/// touch the ledger directly.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    /// Latest close price
    pub price: f64,
    /// Latest sentiment score in [-1, 1]
    pub sentiment: f64,
    /// Per-bar thresholds from the volatility adapter
    pub thresholds: ThresholdSet,
    /// Current support band level
    pub support: f64,
    /// Current resistance band level
    pub resistance: f64,
    /// Direction of the open position, if any
    pub position: Option<Direction>,
}

/// One regime-specific rule set.
pub trait ModeExecutor: Send + Sync {
    /// Evaluate the bar and emit a single intent.
    fn evaluate(&self, ctx: &DecisionContext) -> TradeIntent;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// Trend-following rules for the bullish regime.
///
/// Long-only: buy strength, exit when sentiment decays.
#[derive(Debug, Clone)]
pub struct Aggressive {
    /// Base size before the volatility multiplier
    pub base_size: f64,
}

impl ModeExecutor for Aggressive {
    fn evaluate(&self, ctx: &DecisionContext) -> TradeIntent {
        let t = &ctx.thresholds;

        if ctx.sentiment > t.entry {
            if ctx.position.is_none() {
                let size = (self.base_size * t.size_multiplier).min(MAX_POSITION_FRACTION);
                return TradeIntent {
                    action: TradeAction::EnterLong,
                    size,
                    take_profit: None,
                };
            }
        } else if ctx.sentiment < t.exit && ctx.position == Some(Direction::Long) {
            debug!(sentiment = ctx.sentiment, exit = t.exit, "aggressive exit");
            return TradeIntent::close();
        }

        TradeIntent::hold()
    }

    fn name(&self) -> &'static str {
        "aggressive"
    }
}

/// Short-selling rules for the bearish regime.
#[derive(Debug, Clone)]
pub struct Defensive {
    /// Base size before the volatility multiplier
    pub base_size: f64,
}

impl ModeExecutor for Defensive {
    fn evaluate(&self, ctx: &DecisionContext) -> TradeIntent {
        let t = &ctx.thresholds;

        if ctx.sentiment < t.short {
            if ctx.position.is_none() {
                let size = (self.base_size * t.size_multiplier).min(MAX_POSITION_FRACTION);
                return TradeIntent {
                    action: TradeAction::EnterShort,
                    size,
                    take_profit: None,
                };
            }
        } else if ctx.sentiment > t.cover && ctx.position == Some(Direction::Short) {
            debug!(sentiment = ctx.sentiment, cover = t.cover, "defensive cover");
            return TradeIntent::close();
        }

        TradeIntent::hold()
    }

    fn name(&self) -> &'static str {
        "defensive"
    }
}

/// Band-trading rules for the sideways regime.
///
/// Buys near the support band, sells near the resistance band, targeting
/// the channel midpoint. An entry signal against an open opposite-side
/// position is an explicit flip: the caller closes the old position first
/// and re-enters on the same bar.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    /// Base size before the volatility multiplier
    pub base_size: f64,
    /// Entry proximity to the band, e.g. 0.03 = within 3%
    pub band_buffer: f64,
    /// Minimum profit the midpoint target must offer, e.g. 0.005
    pub min_target_pct: f64,
    /// Last-resort fixed target distance, e.g. 0.05
    pub fallback_target_pct: f64,
}

impl MeanReversion {
    /// Take-profit for an entry at `entry_price`.
    ///
    /// Prefers the channel midpoint; in a degenerate (flat) channel where
    /// the midpoint offers less than `min_target_pct`, falls back to the
    /// opposite band, and finally to a fixed +/-`fallback_target_pct`.
    fn take_profit(&self, entry_price: f64, direction: Direction, support: f64, resistance: f64) -> f64 {
        let midpoint = (support + resistance) / 2.0;
        let usable = |target: f64| match direction {
            Direction::Long => (target - entry_price) / entry_price >= self.min_target_pct,
            Direction::Short => (entry_price - target) / entry_price >= self.min_target_pct,
        };

        if usable(midpoint) {
            return midpoint;
        }
        let opposite_band = match direction {
            Direction::Long => resistance,
            Direction::Short => support,
        };
        if usable(opposite_band) {
            return opposite_band;
        }
        match direction {
            Direction::Long => entry_price * (1.0 + self.fallback_target_pct),
            Direction::Short => entry_price * (1.0 - self.fallback_target_pct),
        }
    }
}

impl ModeExecutor for MeanReversion {
    fn evaluate(&self, ctx: &DecisionContext) -> TradeIntent {
        let t = &ctx.thresholds;
        let size = (self.base_size * t.size_multiplier).min(MAX_POSITION_FRACTION);

        // Near support: go long (flipping out of a short if one is open)
        if ctx.price <= ctx.support * (1.0 + self.band_buffer) {
            if ctx.position.is_none() || ctx.position == Some(Direction::Short) {
                let tp = self.take_profit(ctx.price, Direction::Long, ctx.support, ctx.resistance);
                debug!(price = ctx.price, support = ctx.support, tp, "mean-reversion long");
                return TradeIntent {
                    action: TradeAction::EnterLong,
                    size,
                    take_profit: Some(tp),
                };
            }
        // Near resistance: go short (flipping out of a long if one is open)
        } else if ctx.price >= ctx.resistance * (1.0 - self.band_buffer)
            && (ctx.position.is_none() || ctx.position == Some(Direction::Long))
        {
            let tp = self.take_profit(ctx.price, Direction::Short, ctx.support, ctx.resistance);
            debug!(price = ctx.price, resistance = ctx.resistance, tp, "mean-reversion short");
            return TradeIntent {
                action: TradeAction::EnterShort,
                size,
                take_profit: Some(tp),
            };
        }

        TradeIntent::hold()
    }

    fn name(&self) -> &'static str {
        "mean_reversion"
    }
}
