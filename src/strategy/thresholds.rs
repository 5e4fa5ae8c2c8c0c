//! Volatility-bucketed decision thresholds
//!
//! Maps current annualized volatility to an entry/exit threshold set.
//! The design intent is deliberate and paired: as volatility rises the
//! entry and short thresholds relax (more trades permitted) while the
//! size multiplier shrinks (less risk per trade). The two adjustments
//! always move in opposite directions across buckets.

use crate::types::ThresholdSet;

/// Bucket boundaries for annualized volatility.
const LOW_VOL: f64 = 0.20;
const MEDIUM_VOL: f64 = 0.50;
const HIGH_VOL: f64 = 0.80;

/// Adapter from current volatility to a threshold set.
#[derive(Debug, Clone)]
pub struct ThresholdAdapter {
    /// When false, [`ThresholdAdapter::select`] always returns `static_set`.
    pub use_dynamic: bool,
    /// Fixed thresholds used when dynamic adaptation is disabled.
    pub static_set: ThresholdSet,
}

impl Default for ThresholdAdapter {
    fn default() -> Self {
        Self {
            use_dynamic: true,
            static_set: ThresholdSet {
                entry: 0.0,
                exit: -0.5,
                short: -0.3,
                cover: 0.0,
                size_multiplier: 1.0,
            },
        }
    }
}

impl ThresholdAdapter {
    /// Thresholds for the current bar.
    pub fn select(&self, volatility: f64) -> ThresholdSet {
        if self.use_dynamic {
            Self::for_volatility(volatility)
        } else {
            self.static_set
        }
    }

    /// The four-bucket volatility table.
    pub fn for_volatility(volatility: f64) -> ThresholdSet {
        if volatility < LOW_VOL {
            // Low volatility: selective entries, full size
            ThresholdSet {
                entry: 0.2,
                exit: -0.3,
                short: -0.8,
                cover: 0.3,
                size_multiplier: 1.0,
            }
        } else if volatility < MEDIUM_VOL {
            // Medium volatility: relaxed thresholds
            ThresholdSet {
                entry: 0.1,
                exit: -0.2,
                short: -0.6,
                cover: 0.2,
                size_multiplier: 0.9,
            }
        } else if volatility < HIGH_VOL {
            // High volatility: very relaxed thresholds
            ThresholdSet {
                entry: 0.0,
                exit: -0.1,
                short: -0.4,
                cover: 0.1,
                size_multiplier: 0.7,
            }
        } else {
            // Extreme volatility: entries allowed on slightly negative
            // sentiment, but at half size
            ThresholdSet {
                entry: -0.1,
                exit: -0.3,
                short: -0.3,
                cover: 0.1,
                size_multiplier: 0.5,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(ThresholdAdapter::for_volatility(0.10).entry, 0.2);
        assert_eq!(ThresholdAdapter::for_volatility(0.20).entry, 0.1);
        assert_eq!(ThresholdAdapter::for_volatility(0.49).entry, 0.1);
        assert_eq!(ThresholdAdapter::for_volatility(0.50).entry, 0.0);
        assert_eq!(ThresholdAdapter::for_volatility(0.80).entry, -0.1);
        assert_eq!(ThresholdAdapter::for_volatility(1.50).entry, -0.1);
    }

    #[test]
    fn test_relaxed_entry_pairs_with_smaller_size() {
        // Design intent: across rising-volatility buckets the entry
        // threshold must never tighten while the size multiplier must
        // strictly shrink. Relaxing entries without shrinking size is a
        // violation of the adapter contract.
        let buckets = [
            ThresholdAdapter::for_volatility(0.10),
            ThresholdAdapter::for_volatility(0.30),
            ThresholdAdapter::for_volatility(0.60),
            ThresholdAdapter::for_volatility(0.90),
        ];
        for pair in buckets.windows(2) {
            assert!(pair[1].entry <= pair[0].entry);
            assert!(pair[1].short >= pair[0].short);
            assert!(pair[1].size_multiplier < pair[0].size_multiplier);
        }
    }

    #[test]
    fn test_multiplier_in_unit_range() {
        for vol in [0.0, 0.2, 0.5, 0.8, 2.0] {
            let set = ThresholdAdapter::for_volatility(vol);
            assert!(set.size_multiplier > 0.0 && set.size_multiplier <= 1.0);
        }
    }

    #[test]
    fn test_static_mode_ignores_volatility() {
        let adapter = ThresholdAdapter {
            use_dynamic: false,
            ..Default::default()
        };
        assert_eq!(adapter.select(0.1), adapter.select(1.5));
        assert_eq!(adapter.select(0.9).entry, 0.0);
    }
}
