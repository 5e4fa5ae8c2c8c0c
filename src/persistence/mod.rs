//! Persistence - engine state snapshots and CSV import/export
//!
//! The paper-trading state lives in a single JSON document, rewritten
//! atomically on every step (write to a temp file, then rename) so a
//! crash mid-save can never leave a half-written state behind. CSV
//! handles bar input and report output.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ledger::Trade;
use crate::types::{EquityPoint, MarketBar};

/// JSON state store with atomic writes.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, or fall back to `default` when the file
    /// is missing or unreadable. A corrupt file is logged and replaced on
    /// the next save rather than aborting the run.
    pub fn load_or<T>(&self, default: impl FnOnce() -> T) -> T
    where
        T: DeserializeOwned,
    {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => {
                    info!(path = %self.path.display(), "state loaded");
                    state
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "corrupt state file, starting fresh");
                    default()
                }
            },
            Err(_) => {
                info!(path = %self.path.display(), "no state file, starting fresh");
                default()
            }
        }
    }

    /// Persist atomically: serialize, write to `<path>.tmp`, rename.
    pub fn save<T: Serialize>(&self, state: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("failed to serialize state")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Load a bar series from CSV.
///
/// Expects a header row matching the MarketBar field names:
/// `ts,open,high,low,close,volume,regime_score,sentiment_score`.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<MarketBar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<MarketBar>().enumerate() {
        let bar =
            record.with_context(|| format!("bad bar at {} row {}", path.display(), i + 1))?;
        bars.push(bar);
    }
    info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

/// Write the trade log as CSV.
pub fn export_trades(path: impl AsRef<Path>, trades: &[Trade]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    info!(path = %path.display(), trades = trades.len(), "trades exported");
    Ok(())
}

/// Write the equity curve as CSV.
pub fn export_equity_curve(path: impl AsRef<Path>, curve: &[EquityPoint]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for point in curve {
        writer.serialize(point)?;
    }
    writer.flush()?;
    info!(path = %path.display(), points = curve.len(), "equity curve exported");
    Ok(())
}
