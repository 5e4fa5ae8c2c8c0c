//! RegimeBot - regime-adaptive trading decision and simulation engine
//!
//! Classifies each bar into a market regime, adapts decision thresholds
//! to current volatility, and routes the bar through one of three mode
//! executors. Two drivers share the pipeline: a deterministic backtester
//! over annotated bar files and a persistent one-step-per-invocation
//! paper-trading loop.

pub mod analytics;
pub mod backtesting;
pub mod config;
pub mod features;
pub mod feed;
pub mod ledger;
pub mod paper_trading;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod types;
