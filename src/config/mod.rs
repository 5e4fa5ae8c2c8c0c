//! Configuration management for RegimeBot
//!
//! Defaults for every knob via the builder, optionally overlaid by
//! `config/default` / `config/local` files and `REGIMEBOT_*` environment
//! variables (`__` as the section separator). Loaded once at startup into
//! an immutable `AppConfig`.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::backtesting::BacktestConfig;
use crate::paper_trading::PaperConfig;
use crate::risk::RiskConfig;
use crate::strategy::StrategyParams;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskSettings,
    pub backtest: BacktestSettings,
    pub paper: PaperSettings,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Version tag for logging
    pub tag: String,
    /// Paper-trading state file
    pub state_path: String,
    /// Directory for CSV exports
    pub output_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Lookback window for volatility and bands (bars)
    pub lookback: usize,
    /// Support/resistance band buffer
    pub band_buffer: f64,
    /// Aggressive-mode base size (fraction of equity)
    pub aggressive_size: f64,
    /// Defensive-mode base size
    pub defensive_size: f64,
    /// Mean-reversion base size
    pub mean_reversion_size: f64,
    /// Minimum usable mean-reversion target distance
    pub min_target_pct: f64,
    /// Fixed fallback target distance
    pub fallback_target_pct: f64,
    /// Adapt thresholds to volatility
    pub use_dynamic_thresholds: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    /// Fixed stop-loss distance (e.g. 0.20 = 20%)
    pub stop_loss_pct: f64,
    /// Trailing stop distance from the high-water mark
    pub trailing_stop_pct: f64,
    /// Trend strength required for the trailing stop to ratchet
    pub trailing_min_strength: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    /// Starting cash
    pub initial_cash: f64,
    /// Commission per side, fraction of notional
    pub commission_rate: f64,
    /// Instrument label for the trade log
    pub instrument: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperSettings {
    /// Starting cash for a fresh state
    pub initial_cash: f64,
    /// Commission per side, fraction of notional
    pub commission_rate: f64,
    /// Quote fetch attempts per step
    pub retry_attempts: u32,
    /// Delay between fetch attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Minimum sanity substance for entries
    pub min_sanity_substance: f64,
    /// Drawdown from peak that triggers the pause warning
    pub drawdown_pause_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Quote endpoint base URL
    pub base_url: String,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from defaults, files and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Bot defaults
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.state_path", "data/paper_state.json")?
            .set_default("bot.output_dir", "data")?
            // Strategy defaults
            .set_default("strategy.lookback", 20)?
            .set_default("strategy.band_buffer", 0.03)?
            .set_default("strategy.aggressive_size", 0.95)?
            .set_default("strategy.defensive_size", 0.5)?
            .set_default("strategy.mean_reversion_size", 0.6)?
            .set_default("strategy.min_target_pct", 0.005)?
            .set_default("strategy.fallback_target_pct", 0.05)?
            .set_default("strategy.use_dynamic_thresholds", true)?
            // Risk defaults
            .set_default("risk.stop_loss_pct", 0.20)?
            .set_default("risk.trailing_stop_pct", 0.05)?
            .set_default("risk.trailing_min_strength", 1.0)?
            // Backtest defaults
            .set_default("backtest.initial_cash", 10_000.0)?
            .set_default("backtest.commission_rate", 0.001)?
            .set_default("backtest.instrument", "SIM")?
            // Paper trading defaults
            .set_default("paper.initial_cash", 10_000.0)?
            .set_default("paper.commission_rate", 0.001)?
            .set_default("paper.retry_attempts", 3)?
            .set_default("paper.retry_delay_ms", 500)?
            .set_default("paper.min_sanity_substance", 0.3)?
            .set_default("paper.drawdown_pause_pct", 0.20)?
            // Feed defaults
            .set_default("feed.base_url", "http://localhost:8000")?
            .set_default("feed.timeout_secs", 10)?
            // Load config files if present
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (REGIMEBOT_*)
            .add_source(Environment::with_prefix("REGIMEBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Config digest for the startup log line
    pub fn digest(&self) -> String {
        format!(
            "tag={} lookback={} dynamic_thresholds={} stop={:.2} trail={:.2} state={}",
            self.bot.tag,
            self.strategy.lookback,
            self.strategy.use_dynamic_thresholds,
            self.risk.stop_loss_pct,
            self.risk.trailing_stop_pct,
            self.bot.state_path
        )
    }

    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            lookback: self.strategy.lookback,
            band_buffer: self.strategy.band_buffer,
            aggressive_size: self.strategy.aggressive_size,
            defensive_size: self.strategy.defensive_size,
            mean_reversion_size: self.strategy.mean_reversion_size,
            min_target_pct: self.strategy.min_target_pct,
            fallback_target_pct: self.strategy.fallback_target_pct,
            use_dynamic_thresholds: self.strategy.use_dynamic_thresholds,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            stop_loss_pct: self.risk.stop_loss_pct,
            trailing_stop_pct: self.risk.trailing_stop_pct,
            trailing_min_strength: self.risk.trailing_min_strength,
        }
    }

    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            initial_cash: self.backtest.initial_cash,
            commission_rate: self.backtest.commission_rate,
            instrument: self.backtest.instrument.clone(),
        }
    }

    pub fn paper_config(&self) -> PaperConfig {
        PaperConfig {
            initial_cash: self.paper.initial_cash,
            commission_rate: self.paper.commission_rate,
            retry_attempts: self.paper.retry_attempts,
            retry_delay_ms: self.paper.retry_delay_ms,
            min_sanity_substance: self.paper.min_sanity_substance,
            drawdown_pause_pct: self.paper.drawdown_pause_pct,
        }
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_files() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.strategy.lookback, 20);
        assert!((config.risk.stop_loss_pct - 0.20).abs() < 1e-9);
        assert!((config.paper.drawdown_pause_pct - 0.20).abs() < 1e-9);
        assert!(config.strategy.use_dynamic_thresholds);
    }

    #[test]
    fn test_derived_configs_match_settings() {
        let config = AppConfig::load().unwrap();
        let params = config.strategy_params();
        assert_eq!(params.lookback, config.strategy.lookback);
        assert!((params.aggressive_size - 0.95).abs() < 1e-9);

        let risk = config.risk_config();
        assert!((risk.trailing_stop_pct - 0.05).abs() < 1e-9);

        let bt = config.backtest_config();
        assert_eq!(bt.instrument, "SIM");
    }
}
