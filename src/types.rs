//! Core types used throughout RegimeBot
//!
//! Defines the market bar, regime/direction enums, trading intents and
//! the records shared by the backtest and paper-trading drivers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Trading days per year, used for annualization everywhere.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Validation error raised at bar ingestion.
///
/// The engine never guesses missing or malformed inputs: a bad bar is
/// rejected before it can reach the decision pipeline.
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("bar at ts {ts}: field {field} is not a finite number")]
    NonFinite { ts: i64, field: &'static str },
    #[error("bar at ts {ts}: non-positive price in {field}")]
    NonPositivePrice { ts: i64, field: &'static str },
    #[error("bar at ts {ts}: high {high} below low {low}")]
    HighBelowLow { ts: i64, high: f64, low: f64 },
    #[error("bar at ts {ts}: {field} score {value} outside [-1, 1]")]
    ScoreOutOfRange {
        ts: i64,
        field: &'static str,
        value: f64,
    },
    #[error("bars out of order: ts {ts} follows ts {prev_ts}")]
    OutOfOrder { ts: i64, prev_ts: i64 },
}

/// One market bar annotated with externally produced signal scores.
///
/// Bars arrive ordered by timestamp with no gaps assumed. The regime and
/// sentiment scores must be computed without same-bar look-ahead by the
/// upstream annotator; this engine consumes them as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketBar {
    /// Bar timestamp (Unix milliseconds)
    pub ts: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in base units
    pub volume: f64,
    /// Macro regime score in [-1, 1]
    pub regime_score: f64,
    /// Instrument sentiment score in [-1, 1]
    pub sentiment_score: f64,
}

impl MarketBar {
    /// Validate a single bar. Called at ingestion, before any decision runs.
    pub fn validate(&self) -> Result<(), BarValidationError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("regime_score", self.regime_score),
            ("sentiment_score", self.sentiment_score),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BarValidationError::NonFinite {
                    ts: self.ts,
                    field: name,
                });
            }
        }
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if value <= 0.0 {
                return Err(BarValidationError::NonPositivePrice {
                    ts: self.ts,
                    field: name,
                });
            }
        }
        if self.high < self.low {
            return Err(BarValidationError::HighBelowLow {
                ts: self.ts,
                high: self.high,
                low: self.low,
            });
        }
        for (name, value) in [
            ("regime_score", self.regime_score),
            ("sentiment_score", self.sentiment_score),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(BarValidationError::ScoreOutOfRange {
                    ts: self.ts,
                    field: name,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Validate an ordered series: every bar valid, timestamps strictly increasing.
    pub fn validate_series(bars: &[MarketBar]) -> Result<(), BarValidationError> {
        let mut prev_ts: Option<i64> = None;
        for bar in bars {
            bar.validate()?;
            if let Some(prev) = prev_ts {
                if bar.ts <= prev {
                    return Err(BarValidationError::OutOfOrder {
                        ts: bar.ts,
                        prev_ts: prev,
                    });
                }
            }
            prev_ts = Some(bar.ts);
        }
        Ok(())
    }

    /// Bar timestamp as a UTC datetime (for logs and reports).
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.ts).single().unwrap_or_default()
    }
}

/// Discrete market regime derived from the macro regime score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Bullish,
    Bearish,
    Sideways,
}

impl Regime {
    /// Classify a regime score. Boundary values (exactly +/-0.5) are Sideways.
    pub fn classify(score: f64) -> Self {
        if score > 0.5 {
            Regime::Bullish
        } else if score < -0.5 {
            Regime::Bearish
        } else {
            Regime::Sideways
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Bullish => write!(f, "BULLISH"),
            Regime::Bearish => write!(f, "BEARISH"),
            Regime::Sideways => write!(f, "SIDEWAYS"),
        }
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Action emitted by a mode executor, at most one per bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    EnterLong,
    EnterShort,
    Close,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::EnterLong => write!(f, "ENTER_LONG"),
            TradeAction::EnterShort => write!(f, "ENTER_SHORT"),
            TradeAction::Close => write!(f, "CLOSE"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Fixed or trailing stop-loss breached
    Stop,
    /// Take-profit target reached
    Target,
    /// Strategy signal reversed
    Signal,
    /// Forced liquidation (end of backtest, manual close)
    Forced,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Stop => write!(f, "STOP"),
            ExitReason::Target => write!(f, "TARGET"),
            ExitReason::Signal => write!(f, "SIGNAL"),
            ExitReason::Forced => write!(f, "FORCED"),
        }
    }
}

/// Trading intent produced for one bar/step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    /// What to do
    pub action: TradeAction,
    /// Equity fraction to commit on entry (0 for Close/Hold)
    pub size: f64,
    /// Take-profit hint from the executor (mean reversion sets one)
    pub take_profit: Option<f64>,
}

impl TradeIntent {
    pub fn hold() -> Self {
        Self {
            action: TradeAction::Hold,
            size: 0.0,
            take_profit: None,
        }
    }

    pub fn close() -> Self {
        Self {
            action: TradeAction::Close,
            size: 0.0,
            take_profit: None,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.action, TradeAction::EnterLong | TradeAction::EnterShort)
    }
}

/// Decision thresholds derived per bar from current volatility.
///
/// Never persisted; recomputed every bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Minimum sentiment to enter long (aggressive mode)
    pub entry: f64,
    /// Sentiment below which a long is closed
    pub exit: f64,
    /// Maximum sentiment to enter short (defensive mode)
    pub short: f64,
    /// Sentiment above which a short is covered
    pub cover: f64,
    /// Position-size multiplier in (0, 1]
    pub size_multiplier: f64,
}

/// One point of the equity curve / daily snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Snapshot timestamp (Unix milliseconds)
    pub ts: i64,
    /// Free cash
    pub cash: f64,
    /// Marked value of the open position (0 when flat)
    pub positions_value: f64,
    /// cash + positions_value
    pub total_equity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bar(ts: i64) -> MarketBar {
        MarketBar {
            ts,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1000.0,
            regime_score: 0.3,
            sentiment_score: 0.1,
        }
    }

    #[test]
    fn test_regime_classification() {
        assert_eq!(Regime::classify(0.6), Regime::Bullish);
        assert_eq!(Regime::classify(-0.6), Regime::Bearish);
        assert_eq!(Regime::classify(0.0), Regime::Sideways);
        // Boundary values resolve to Sideways
        assert_eq!(Regime::classify(0.5), Regime::Sideways);
        assert_eq!(Regime::classify(-0.5), Regime::Sideways);
        assert_eq!(Regime::classify(0.500001), Regime::Bullish);
        assert_eq!(Regime::classify(-0.500001), Regime::Bearish);
    }

    #[test]
    fn test_valid_bar_passes() {
        assert!(make_bar(1).validate().is_ok());
    }

    #[test]
    fn test_nan_close_rejected() {
        let mut bar = make_bar(1);
        bar.close = f64::NAN;
        assert!(matches!(
            bar.validate(),
            Err(BarValidationError::NonFinite { field: "close", .. })
        ));
    }

    #[test]
    fn test_score_out_of_range_rejected() {
        let mut bar = make_bar(1);
        bar.regime_score = 1.5;
        assert!(matches!(
            bar.validate(),
            Err(BarValidationError::ScoreOutOfRange { .. })
        ));
    }

    #[test]
    fn test_high_below_low_rejected() {
        let mut bar = make_bar(1);
        bar.high = 98.0;
        assert!(matches!(
            bar.validate(),
            Err(BarValidationError::HighBelowLow { .. })
        ));
    }

    #[test]
    fn test_series_ordering_enforced() {
        let bars = vec![make_bar(2), make_bar(1)];
        assert!(matches!(
            MarketBar::validate_series(&bars),
            Err(BarValidationError::OutOfOrder { .. })
        ));
        let bars = vec![make_bar(1), make_bar(2)];
        assert!(MarketBar::validate_series(&bars).is_ok());
    }
}
