//! Paper trading engine
//!
//! One decision step per invocation: load the persisted state, supervise
//! the open position, scan entry candidates, snapshot equity, save. The
//! caller owns scheduling and guarantees a single concurrent invocation
//! per state file. Candidates arrive with their annotated bar history
//! already attached; this engine never fetches or annotates data beyond
//! the single quote used to mark an open position.

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::feed::{fetch_with_retry, PriceFeed, SanityAction, SanityChecker};
use crate::ledger::{PositionLedger, Trade};
use crate::persistence::StateStore;
use crate::risk::RiskManager;
use crate::strategy::StrategyEngine;
use crate::types::{Direction, EquityPoint, ExitReason, MarketBar, TradeAction};

/// Paper-trading loop configuration.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Starting cash for a fresh state
    pub initial_cash: f64,
    /// Commission per side, as a fraction of notional
    pub commission_rate: f64,
    /// Price fetch attempts before falling back to the entry price
    pub retry_attempts: u32,
    /// Delay between fetch attempts (milliseconds)
    pub retry_delay_ms: u64,
    /// Minimum sanity substance for an entry to proceed
    pub min_sanity_substance: f64,
    /// Drawdown from peak equity that triggers the pause warning
    pub drawdown_pause_pct: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_cash: 10_000.0,
            commission_rate: 0.001,
            retry_attempts: 3,
            retry_delay_ms: 500,
            min_sanity_substance: 0.3,
            drawdown_pause_pct: 0.20,
        }
    }
}

/// The persisted document. Ledger fields are flattened so the JSON reads
/// as one object: cash, position, trades, peak_equity, total_equity,
/// last_update, daily_snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(flatten)]
    pub ledger: PositionLedger,
    /// Highest total equity ever observed
    pub peak_equity: f64,
    /// Total equity at the last step
    pub total_equity: f64,
    /// Timestamp of the last completed step (Unix milliseconds)
    pub last_update: i64,
    /// One equity point per UTC day
    pub daily_snapshots: Vec<EquityPoint>,
}

impl EngineState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            ledger: PositionLedger::new(initial_cash),
            peak_equity: initial_cash,
            total_equity: initial_cash,
            last_update: 0,
            daily_snapshots: Vec::new(),
        }
    }
}

/// One entry candidate: an instrument plus its annotated bar history,
/// newest bar last.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub instrument: String,
    pub bars: Vec<MarketBar>,
}

/// What a step did, for callers and tests.
#[derive(Debug, Clone)]
pub struct StepSummary {
    /// Trade closed this step, if any
    pub closed: Option<Trade>,
    /// Instrument entered this step, if any
    pub entered: Option<String>,
    pub total_equity: f64,
}

/// The paper-trading loop.
pub struct PaperTradingEngine {
    config: PaperConfig,
    strategy: StrategyEngine,
    risk: RiskManager,
    store: StateStore,
    feed: Box<dyn PriceFeed>,
    sanity: Box<dyn SanityChecker>,
}

impl PaperTradingEngine {
    pub fn new(
        config: PaperConfig,
        strategy: StrategyEngine,
        risk: RiskManager,
        store: StateStore,
        feed: Box<dyn PriceFeed>,
        sanity: Box<dyn SanityChecker>,
    ) -> Self {
        Self {
            config,
            strategy,
            risk,
            store,
            feed,
            sanity,
        }
    }

    /// Run one step. Candidate failures are skipped; only state-file I/O
    /// aborts the step.
    pub async fn run_step(&self, candidates: &[Candidate]) -> Result<StepSummary> {
        let mut state = self
            .store
            .load_or(|| EngineState::new(self.config.initial_cash));
        let now = Utc::now().timestamp_millis();

        let mut closed = None;
        let mut mark_price = None;

        if state.ledger.position.is_some() {
            let (price, trade) = self.supervise_position(&mut state, candidates, now).await;
            mark_price = Some(price);
            closed = trade;
        }

        let mut entered = None;
        if state.ledger.is_flat() {
            if let Some((instrument, price)) = self.scan_candidates(&mut state, candidates).await {
                mark_price = Some(price);
                entered = Some(instrument);
            }
        }

        let equity = match (&state.ledger.position, mark_price) {
            (Some(_), Some(price)) => state.ledger.equity(price),
            _ => state.ledger.cash,
        };
        state.total_equity = equity;
        state.peak_equity = state.peak_equity.max(equity);

        if state.peak_equity > 0.0 {
            let drawdown = (state.peak_equity - equity) / state.peak_equity;
            if drawdown > self.config.drawdown_pause_pct {
                warn!(
                    drawdown,
                    peak = state.peak_equity,
                    equity,
                    "drawdown beyond pause threshold, consider halting entries"
                );
            }
        }

        self.append_daily_snapshot(&mut state, now, mark_price);
        state.last_update = now;
        self.store.save(&state).context("failed to persist state")?;

        Ok(StepSummary {
            closed,
            entered,
            total_equity: equity,
        })
    }

    /// Refresh the open position's price and apply the risk checks.
    /// Returns the mark price used and the trade if the position closed.
    async fn supervise_position(
        &self,
        state: &mut EngineState,
        candidates: &[Candidate],
        now: i64,
    ) -> (f64, Option<Trade>) {
        let (instrument, entry_price) = match state.ledger.position.as_ref() {
            Some(position) => (position.instrument.clone(), position.entry_price),
            None => return (0.0, None),
        };

        let price = match fetch_with_retry(
            self.feed.as_ref(),
            &instrument,
            self.config.retry_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
        )
        .await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "price refresh exhausted, marking at entry");
                entry_price
            }
        };

        let closes: Vec<f64> = candidates
            .iter()
            .find(|c| c.instrument == instrument)
            .map(|c| c.bars.iter().map(|b| b.close).collect())
            .unwrap_or_default();

        let lookback = self.strategy.params().lookback;
        let reason = state
            .ledger
            .position
            .as_mut()
            .and_then(|position| self.risk.check_exit(position, price, &closes, lookback));
        let trade = reason.and_then(|reason| {
            state
                .ledger
                .close(price, now, reason, self.config.commission_rate)
        });

        (price, trade)
    }

    /// Walk the candidates until one produces an approved entry.
    async fn scan_candidates(
        &self,
        state: &mut EngineState,
        candidates: &[Candidate],
    ) -> Option<(String, f64)> {
        for candidate in candidates {
            match self.try_enter(state, candidate).await {
                Ok(Some(price)) => return Some((candidate.instrument.clone(), price)),
                Ok(None) => {}
                Err(e) => {
                    warn!(instrument = %candidate.instrument, error = %e, "candidate skipped");
                }
            }
        }
        None
    }

    /// Evaluate one candidate; Ok(Some(price)) when a position was opened.
    async fn try_enter(&self, state: &mut EngineState, candidate: &Candidate) -> Result<Option<f64>> {
        MarketBar::validate_series(&candidate.bars)
            .with_context(|| format!("bad bar series for {}", candidate.instrument))?;
        let bar = match candidate.bars.last() {
            Some(bar) => bar,
            None => return Ok(None),
        };

        let closes: Vec<f64> = candidate.bars.iter().map(|b| b.close).collect();
        let decision = self.strategy.decide(&closes, bar, None);
        if !decision.intent.is_entry() {
            return Ok(None);
        }

        let verdict = self
            .sanity
            .check(&candidate.instrument, &decision.intent)
            .await
            .context("sanity check failed")?;
        if verdict.action == SanityAction::Veto || verdict.substance < self.config.min_sanity_substance {
            info!(
                instrument = %candidate.instrument,
                action = ?verdict.action,
                substance = verdict.substance,
                "entry vetoed"
            );
            return Ok(None);
        }

        let direction = match decision.intent.action {
            TradeAction::EnterLong => Direction::Long,
            _ => Direction::Short,
        };
        state.ledger.enter(
            &candidate.instrument,
            direction,
            bar.close,
            decision.intent.size,
            bar.ts,
            self.risk.stop_level(direction, bar.close),
            decision.intent.take_profit,
            decision.regime,
            self.config.commission_rate,
        );
        Ok(Some(bar.close))
    }

    /// Keep one snapshot per UTC day, overwriting today's on repeat steps.
    fn append_daily_snapshot(&self, state: &mut EngineState, now: i64, mark_price: Option<f64>) {
        let positions_value = mark_price
            .map(|p| state.ledger.positions_value(p))
            .unwrap_or(0.0);
        let point = EquityPoint {
            ts: now,
            cash: state.ledger.cash,
            positions_value,
            total_equity: state.total_equity,
        };

        let same_day = state.daily_snapshots.last().map(|last| {
            let last_day = Utc.timestamp_millis_opt(last.ts).single().map(|d| d.date_naive());
            let today = Utc.timestamp_millis_opt(now).single().map(|d| d.date_naive());
            last_day.is_some() && last_day == today
        });

        match same_day {
            Some(true) => {
                let last_idx = state.daily_snapshots.len() - 1;
                state.daily_snapshots[last_idx] = point;
            }
            _ => state.daily_snapshots.push(point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{NoopSanityChecker, ReplayFeed, SanityVerdict};
    use crate::risk::RiskConfig;
    use crate::strategy::StrategyParams;
    use crate::types::TradeIntent;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct DeadFeed;

    #[async_trait]
    impl PriceFeed for DeadFeed {
        async fn latest_close(&self, _instrument: &str) -> Result<f64> {
            Err(anyhow!("feed offline"))
        }
    }

    struct VetoChecker;

    #[async_trait]
    impl SanityChecker for VetoChecker {
        async fn check(&self, _instrument: &str, _intent: &TradeIntent) -> Result<SanityVerdict> {
            Ok(SanityVerdict {
                action: SanityAction::Veto,
                substance: 0.9,
            })
        }
    }

    fn temp_state(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "regimebot-paper-{}-{}.json",
            std::process::id(),
            name
        ))
    }

    fn make_engine(
        state_path: &PathBuf,
        feed: Box<dyn PriceFeed>,
        sanity: Box<dyn SanityChecker>,
    ) -> PaperTradingEngine {
        PaperTradingEngine::new(
            PaperConfig {
                commission_rate: 0.0,
                retry_delay_ms: 1,
                ..Default::default()
            },
            StrategyEngine::new(StrategyParams::default()),
            RiskManager::new(RiskConfig::default()),
            StateStore::new(state_path),
            feed,
            sanity,
        )
    }

    fn bullish_candidate(instrument: &str) -> Candidate {
        let bars = (1..=5)
            .map(|i| MarketBar {
                ts: i * 60_000,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.0 + i as f64,
                volume: 1_000.0,
                regime_score: 0.7,
                sentiment_score: 0.4,
            })
            .collect();
        Candidate {
            instrument: instrument.to_string(),
            bars,
        }
    }

    #[tokio::test]
    async fn test_fresh_state_enters_on_bullish_candidate() {
        let path = temp_state("enter");
        std::fs::remove_file(&path).ok();
        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(NoopSanityChecker));

        let summary = engine.run_step(&[bullish_candidate("TEST")]).await.unwrap();
        assert_eq!(summary.entered.as_deref(), Some("TEST"));

        // Reload from disk: the position survived the round trip
        let store = StateStore::new(&path);
        let state: EngineState = store.load_or(|| EngineState::new(0.0));
        let position = state.ledger.position.expect("position persisted");
        assert_eq!(position.instrument, "TEST");
        assert_eq!(position.direction, Direction::Long);
        assert_eq!(state.daily_snapshots.len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_stop_breach_closes_position() {
        let path = temp_state("stop");
        std::fs::remove_file(&path).ok();

        // Step 1: enter at 105
        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(NoopSanityChecker));
        engine.run_step(&[bullish_candidate("TEST")]).await.unwrap();

        // Step 2: quote crashes through the 20% stop (105 * 0.8 = 84)
        let engine = make_engine(
            &path,
            Box::new(ReplayFeed::single("TEST", vec![80.0])),
            Box::new(NoopSanityChecker),
        );
        let summary = engine.run_step(&[]).await.unwrap();
        let trade = summary.closed.expect("stop close");
        assert_eq!(trade.exit_reason, ExitReason::Stop);
        assert!((trade.exit_price - 80.0).abs() < 1e-9);

        let state: EngineState = StateStore::new(&path).load_or(|| EngineState::new(0.0));
        assert!(state.ledger.is_flat());
        assert_eq!(state.ledger.trades.len(), 1);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_sanity_veto_blocks_entry() {
        let path = temp_state("veto");
        std::fs::remove_file(&path).ok();
        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(VetoChecker));

        let summary = engine.run_step(&[bullish_candidate("TEST")]).await.unwrap();
        assert!(summary.entered.is_none());

        let state: EngineState = StateStore::new(&path).load_or(|| EngineState::new(0.0));
        assert!(state.ledger.is_flat());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_feed_failure_marks_at_entry() {
        let path = temp_state("deadfeed");
        std::fs::remove_file(&path).ok();

        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(NoopSanityChecker));
        let entry = engine.run_step(&[bullish_candidate("TEST")]).await.unwrap();
        let entry_equity = entry.total_equity;

        // Feed stays dead: position marked at entry, no spurious exit
        let summary = engine.run_step(&[]).await.unwrap();
        assert!(summary.closed.is_none());
        assert!((summary.total_equity - entry_equity).abs() < 1e-9);

        let state: EngineState = StateStore::new(&path).load_or(|| EngineState::new(0.0));
        assert!(state.ledger.position.is_some());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_bad_candidate_skipped_good_one_entered() {
        let path = temp_state("skip");
        std::fs::remove_file(&path).ok();
        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(NoopSanityChecker));

        let mut bad = bullish_candidate("BAD");
        bad.bars[2].close = f64::NAN;
        let summary = engine
            .run_step(&[bad, bullish_candidate("GOOD")])
            .await
            .unwrap();
        assert_eq!(summary.entered.as_deref(), Some("GOOD"));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_peak_equity_never_decreases() {
        let path = temp_state("peak");
        std::fs::remove_file(&path).ok();

        let engine = make_engine(&path, Box::new(DeadFeed), Box::new(NoopSanityChecker));
        engine.run_step(&[bullish_candidate("TEST")]).await.unwrap();

        // Mark well below entry: equity drops but the peak holds
        let engine = make_engine(
            &path,
            Box::new(ReplayFeed::single("TEST", vec![95.0])),
            Box::new(NoopSanityChecker),
        );
        engine.run_step(&[]).await.unwrap();

        let state: EngineState = StateStore::new(&path).load_or(|| EngineState::new(0.0));
        assert!(state.peak_equity >= 10_000.0 - 1e-9);
        assert!(state.total_equity < state.peak_equity);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_engine_state_serde_round_trip() {
        let mut state = EngineState::new(10_000.0);
        state.ledger.enter(
            "TEST",
            Direction::Long,
            100.0,
            0.5,
            1,
            80.0,
            Some(110.0),
            crate::types::Regime::Bullish,
            0.0,
        );
        state.peak_equity = 10_500.0;
        state.last_update = 42;

        let json = serde_json::to_string(&state).unwrap();
        // Flattened ledger: top-level keys, no nested "ledger" object
        assert!(json.contains("\"cash\""));
        assert!(!json.contains("\"ledger\""));

        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ledger.cash, state.ledger.cash);
        assert_eq!(back.peak_equity, state.peak_equity);
        let position = back.ledger.position.unwrap();
        assert_eq!(position.take_profit, Some(110.0));
    }
}
