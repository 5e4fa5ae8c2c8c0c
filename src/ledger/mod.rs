//! Position ledger - cash, the open position and the trade log
//!
//! Single-position accounting shared by both drivers. The ledger holds at
//! most one open position; entries while a position is open and
//! non-positive sizes are caller bugs and abort immediately rather than
//! corrupting the books.
//!
//! Cash accounting is collateral-based for both directions: entering
//! reserves `units * entry_price` (plus commission), closing releases the
//! collateral plus realized PnL net of both commission legs. Total equity
//! therefore always equals cash + marked position value.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::types::{Direction, ExitReason, Regime};

/// The open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument identifier
    pub instrument: String,
    pub direction: Direction,
    /// Entry fill price
    pub entry_price: f64,
    /// Size in instrument units
    pub size: f64,
    /// Entry timestamp (Unix milliseconds)
    pub entry_ts: i64,
    /// Fixed stop-loss level
    pub stop_loss: f64,
    /// Take-profit level, if the entering mode set one
    pub take_profit: Option<f64>,
    /// Best favorable price seen since entry; None until trailing arms
    pub high_water_mark: Option<f64>,
    /// Regime active at entry
    pub mode: Regime,
}

impl Position {
    /// Signed PnL at `price`, in cash units.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => (price - self.entry_price) * self.size,
            Direction::Short => (self.entry_price - price) * self.size,
        }
    }

    /// Marked value: collateral plus unrealized PnL.
    pub fn market_value(&self, price: f64) -> f64 {
        self.size * self.entry_price + self.unrealized_pnl(price)
    }
}

/// One completed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_ts: i64,
    pub exit_ts: i64,
    /// Size in instrument units
    pub size: f64,
    /// Realized PnL net of both commission legs
    pub pnl: f64,
    /// PnL as a fraction of entry notional
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
    /// Hold duration in milliseconds
    pub holding_ms: i64,
    /// Regime active at entry
    pub mode: Regime,
}

/// Cash + open position + completed trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLedger {
    /// Free cash
    pub cash: f64,
    /// The open position, if any
    pub position: Option<Position>,
    /// Completed trades, in close order
    pub trades: Vec<Trade>,
}

impl PositionLedger {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            position: None,
            trades: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Marked value of the open position, 0 when flat.
    pub fn positions_value(&self, mark_price: f64) -> f64 {
        self.position
            .as_ref()
            .map(|p| p.market_value(mark_price))
            .unwrap_or(0.0)
    }

    /// Total equity at `mark_price`.
    pub fn equity(&self, mark_price: f64) -> f64 {
        self.cash + self.positions_value(mark_price)
    }

    /// Open a position, reserving collateral and the entry commission.
    ///
    /// `size_fraction` is the equity fraction to commit; it is converted
    /// to units at the entry price. Panics on an already-open position or
    /// a non-positive size: both indicate a driver bug.
    #[allow(clippy::too_many_arguments)]
    pub fn enter(
        &mut self,
        instrument: &str,
        direction: Direction,
        entry_price: f64,
        size_fraction: f64,
        entry_ts: i64,
        stop_loss: f64,
        take_profit: Option<f64>,
        mode: Regime,
        commission_rate: f64,
    ) {
        assert!(
            self.position.is_none(),
            "entry with a position already open"
        );
        assert!(
            size_fraction > 0.0 && entry_price > 0.0,
            "non-positive entry size or price"
        );

        let equity = self.equity(entry_price);
        // Scale down so notional + commission never exceeds cash
        let notional = (equity * size_fraction).min(self.cash / (1.0 + commission_rate));
        let units = notional / entry_price;
        let commission = notional * commission_rate;

        self.cash -= notional + commission;
        self.position = Some(Position {
            instrument: instrument.to_string(),
            direction,
            entry_price,
            size: units,
            entry_ts,
            stop_loss,
            take_profit,
            high_water_mark: None,
            mode,
        });

        info!(
            instrument,
            %direction,
            price = entry_price,
            units,
            notional,
            stop_loss,
            "position opened"
        );
    }

    /// Close the open position at `exit_price`, returning the trade.
    ///
    /// Returns None when flat (closing nothing is a no-op for callers
    /// reacting to stale signals).
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_ts: i64,
        reason: ExitReason,
        commission_rate: f64,
    ) -> Option<Trade> {
        let position = self.position.take()?;

        let entry_notional = position.size * position.entry_price;
        let exit_notional = position.size * exit_price;
        let gross_pnl = position.unrealized_pnl(exit_price);
        let commission = (entry_notional + exit_notional) * commission_rate;
        let pnl = gross_pnl - commission;

        // Entry commission was already charged at open
        self.cash += entry_notional + gross_pnl - exit_notional * commission_rate;

        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            instrument: position.instrument,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            entry_ts: position.entry_ts,
            exit_ts,
            size: position.size,
            pnl,
            pnl_pct: if entry_notional > 0.0 {
                pnl / entry_notional
            } else {
                0.0
            },
            exit_reason: reason,
            holding_ms: exit_ts - position.entry_ts,
            mode: position.mode,
        };

        info!(
            instrument = %trade.instrument,
            direction = %trade.direction,
            exit_price,
            pnl = trade.pnl,
            reason = %reason,
            "position closed"
        );

        self.trades.push(trade.clone());
        Some(trade)
    }
}
