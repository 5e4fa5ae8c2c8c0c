//! Risk manager - stop-loss, trailing stop and take-profit supervision
//!
//! Runs before the strategy on every bar/step. Exits it orders are final;
//! they are never vetoed downstream. The trailing stop arms only while
//! the trend gate allows it, but once the high-water mark has moved it
//! never moves back: the effective stop can only tighten over the life
//! of a position.

use tracing::debug;

use crate::features;
use crate::ledger::Position;
use crate::types::{Direction, ExitReason};

/// Risk configuration.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Fixed stop-loss distance from entry (e.g. 0.20 = 20%)
    pub stop_loss_pct: f64,
    /// Trailing stop distance from the high-water mark (e.g. 0.05 = 5%)
    pub trailing_stop_pct: f64,
    /// Trend strength at or above which the trailing stop ratchets
    pub trailing_min_strength: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.20,
            trailing_stop_pct: 0.05,
            trailing_min_strength: 1.0,
        }
    }
}

/// Decides, per update, whether the trailing stop may ratchet.
///
/// The default gate compares normalized trend strength against a fixed
/// threshold; alternate gates exist mostly for tests and for disabling
/// trailing outright.
pub trait TrendGate: Send + Sync {
    fn allows(&self, trend_strength: f64) -> bool;
}

/// Ratchet only while the trend is at least `min_strength` sigmas.
#[derive(Debug, Clone)]
pub struct StrengthThresholdGate {
    pub min_strength: f64,
}

impl TrendGate for StrengthThresholdGate {
    fn allows(&self, trend_strength: f64) -> bool {
        trend_strength >= self.min_strength
    }
}

/// Trailing stop always active.
#[derive(Debug, Clone)]
pub struct AlwaysOn;

impl TrendGate for AlwaysOn {
    fn allows(&self, _trend_strength: f64) -> bool {
        true
    }
}

/// Trailing stop never arms; only the fixed stop and take-profit apply.
#[derive(Debug, Clone)]
pub struct AlwaysOff;

impl TrendGate for AlwaysOff {
    fn allows(&self, _trend_strength: f64) -> bool {
        false
    }
}

/// Stop-loss / take-profit supervisor.
pub struct RiskManager {
    config: RiskConfig,
    gate: Box<dyn TrendGate>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        let gate = Box::new(StrengthThresholdGate {
            min_strength: config.trailing_min_strength,
        });
        Self { config, gate }
    }

    pub fn with_gate(config: RiskConfig, gate: Box<dyn TrendGate>) -> Self {
        Self { config, gate }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Fixed stop level for a new entry.
    pub fn stop_level(&self, direction: Direction, entry_price: f64) -> f64 {
        match direction {
            Direction::Long => entry_price * (1.0 - self.config.stop_loss_pct),
            Direction::Short => entry_price * (1.0 + self.config.stop_loss_pct),
        }
    }

    /// Check the open position against `price`, ratcheting the trailing
    /// stop first. Returns the exit to take, if any; stop breaches win
    /// over take-profit when both trigger on the same bar.
    ///
    /// `closes` is the close history used to measure trend strength for
    /// the gate; `lookback` matches the strategy's feature window.
    pub fn check_exit(
        &self,
        position: &mut Position,
        price: f64,
        closes: &[f64],
        lookback: usize,
    ) -> Option<ExitReason> {
        let strength = features::trend_strength(closes, lookback);
        if self.gate.allows(strength) {
            self.ratchet(position, price);
        }

        let stop = self.effective_stop(position);
        let breached = match position.direction {
            Direction::Long => price <= stop,
            Direction::Short => price >= stop,
        };
        if breached {
            debug!(price, stop, strength, "stop breached");
            return Some(ExitReason::Stop);
        }

        if let Some(tp) = position.take_profit {
            let hit = match position.direction {
                Direction::Long => price >= tp,
                Direction::Short => price <= tp,
            };
            if hit {
                debug!(price, tp, "take-profit hit");
                return Some(ExitReason::Target);
            }
        }

        None
    }

    /// Advance the high-water mark if `price` is a new favorable extreme.
    /// The mark never retreats.
    fn ratchet(&self, position: &mut Position, price: f64) {
        let improved = match (position.high_water_mark, position.direction) {
            (None, _) => true,
            (Some(hwm), Direction::Long) => price > hwm,
            (Some(hwm), Direction::Short) => price < hwm,
        };
        if improved {
            position.high_water_mark = Some(price);
        }
    }

    /// The binding stop: the fixed stop, tightened by the trailing stop
    /// once the high-water mark is set.
    pub fn effective_stop(&self, position: &Position) -> f64 {
        let trail = self.config.trailing_stop_pct;
        match (position.direction, position.high_water_mark) {
            (Direction::Long, Some(hwm)) => position.stop_loss.max(hwm * (1.0 - trail)),
            (Direction::Short, Some(hwm)) => position.stop_loss.min(hwm * (1.0 + trail)),
            (_, None) => position.stop_loss,
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}
