//! Collaborator seam - price feed and sanity checker
//!
//! The engine logic is synchronous; these traits are the only async
//! surface, awaited to completion once per step. The HTTP implementations
//! are thin adapters over single JSON endpoints; everything upstream of a
//! quote (data pipelines, signal annotation) lives outside this crate.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::types::TradeIntent;

/// Source of current prices for open-position marking.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest_close(&self, instrument: &str) -> Result<f64>;
}

/// In-memory feed replaying a fixed close series per instrument.
///
/// Each call returns the next close and advances the cursor; an exhausted
/// series errors, which doubles as a fault injector in retry tests.
pub struct ReplayFeed {
    series: HashMap<String, Vec<f64>>,
    cursors: Mutex<HashMap<String, usize>>,
}

impl ReplayFeed {
    pub fn new(series: HashMap<String, Vec<f64>>) -> Self {
        Self {
            series,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn single(instrument: &str, closes: Vec<f64>) -> Self {
        let mut series = HashMap::new();
        series.insert(instrument.to_string(), closes);
        Self::new(series)
    }
}

#[async_trait]
impl PriceFeed for ReplayFeed {
    async fn latest_close(&self, instrument: &str) -> Result<f64> {
        let closes = self
            .series
            .get(instrument)
            .ok_or_else(|| anyhow!("no series for {instrument}"))?;

        let mut cursors = self
            .cursors
            .lock()
            .map_err(|_| anyhow!("replay cursor lock poisoned"))?;
        let cursor = cursors.entry(instrument.to_string()).or_insert(0);
        let close = closes
            .get(*cursor)
            .copied()
            .ok_or_else(|| anyhow!("series exhausted for {instrument}"))?;
        *cursor += 1;
        Ok(close)
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
}

/// Quote feed over a single JSON HTTP endpoint.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn latest_close(&self, instrument: &str) -> Result<f64> {
        let url = format!("{}/quote/{}", self.base_url, instrument);
        let quote: QuoteResponse = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("quote request failed for {instrument}"))?
            .error_for_status()
            .with_context(|| format!("quote endpoint rejected {instrument}"))?
            .json()
            .await
            .with_context(|| format!("bad quote payload for {instrument}"))?;

        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(anyhow!("bad quote price {} for {instrument}", quote.price));
        }
        Ok(quote.price)
    }
}

/// Fetch a price with a fixed number of attempts and a fixed delay.
/// Failures short of the last attempt are logged and retried.
pub async fn fetch_with_retry(
    feed: &dyn PriceFeed,
    instrument: &str,
    attempts: u32,
    delay: Duration,
) -> Result<f64> {
    let mut last_err = anyhow!("no fetch attempts configured");
    for attempt in 1..=attempts.max(1) {
        match feed.latest_close(instrument).await {
            Ok(price) => return Ok(price),
            Err(e) => {
                warn!(instrument, attempt, error = %e, "price fetch failed");
                last_err = e;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err)
}

/// What a sanity verdict recommends about a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityAction {
    Confirm,
    Veto,
    Unrelated,
}

/// Opaque second opinion on an entry. The engine only compares the action
/// tag and the substance score against its configured minimum; it never
/// interprets where the verdict came from.
#[derive(Debug, Clone, Copy)]
pub struct SanityVerdict {
    pub action: SanityAction,
    pub substance: f64,
}

/// Optional pre-entry check consulted by the paper-trading loop.
#[async_trait]
pub trait SanityChecker: Send + Sync {
    async fn check(&self, instrument: &str, intent: &TradeIntent) -> Result<SanityVerdict>;
}

/// Always confirms with full substance; the default when no external
/// checker is wired in.
pub struct NoopSanityChecker;

#[async_trait]
impl SanityChecker for NoopSanityChecker {
    async fn check(&self, _instrument: &str, _intent: &TradeIntent) -> Result<SanityVerdict> {
        Ok(SanityVerdict {
            action: SanityAction::Confirm,
            substance: 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyFeed {
        failures_before_success: Mutex<u32>,
        price: f64,
    }

    #[async_trait]
    impl PriceFeed for FlakyFeed {
        async fn latest_close(&self, _instrument: &str) -> Result<f64> {
            let mut remaining = self.failures_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("transient failure"));
            }
            Ok(self.price)
        }
    }

    #[tokio::test]
    async fn test_replay_feed_advances() {
        let feed = ReplayFeed::single("TEST", vec![100.0, 101.0, 102.0]);
        assert_eq!(feed.latest_close("TEST").await.unwrap(), 100.0);
        assert_eq!(feed.latest_close("TEST").await.unwrap(), 101.0);
        assert_eq!(feed.latest_close("TEST").await.unwrap(), 102.0);
        assert!(feed.latest_close("TEST").await.is_err());
    }

    #[tokio::test]
    async fn test_replay_feed_unknown_instrument() {
        let feed = ReplayFeed::single("TEST", vec![100.0]);
        assert!(feed.latest_close("OTHER").await.is_err());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let feed = FlakyFeed {
            failures_before_success: Mutex::new(2),
            price: 99.5,
        };
        let price = fetch_with_retry(&feed, "TEST", 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(price, 99.5);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let feed = FlakyFeed {
            failures_before_success: Mutex::new(10),
            price: 99.5,
        };
        let result = fetch_with_retry(&feed, "TEST", 3, Duration::from_millis(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_noop_checker_confirms() {
        let verdict = NoopSanityChecker
            .check("TEST", &TradeIntent::hold())
            .await
            .unwrap();
        assert_eq!(verdict.action, SanityAction::Confirm);
        assert!(verdict.substance >= 1.0);
    }
}
