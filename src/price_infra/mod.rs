pub mod connectors;
pub mod normalizer;
pub mod freshness;
pub mod collector;
pub mod outlier;
pub mod aggregator;
pub mod registry;
pub mod health;

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::price_infra::connectors::PriceFeed;
use crate::types::bps::Bps;
use crate::types::ids::SourceKey;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

/// Decay-derived magnitude; zero means the reading is excluded.
pub type Weight = u128;

/// What a provider answered, in its own fixed-point scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawReading {
    pub price: i128,
    pub timestamp: Timestamp,
}

impl RawReading {
    pub fn new(price: i128, timestamp: Timestamp) -> Self {
        RawReading { price, timestamp }
    }
}

/// One normalized, weighted observation. Lives only for the duration of an
/// aggregation call. `weight > 0` implies `0 < timestamp <= now` and the
/// reading is within the stale threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReading {
    pub price: Price,
    pub weight: Weight,
    pub timestamp: Timestamp,
}

impl SourceReading {
    pub fn is_fresh(&self) -> bool {
        self.weight > 0
    }
}

/// A configured provider. Never mutated in place: replace = remove + add.
#[derive(Clone)]
pub struct SourceDescriptor {
    pub label: String,
    pub feed: Arc<dyn PriceFeed>,
    pub key: SourceKey,
    pub decimals: u8,
}

impl SourceDescriptor {
    pub fn new(label: impl Into<String>, feed: Arc<dyn PriceFeed>, key: SourceKey, decimals: u8) -> Self {
        SourceDescriptor {
            label: label.into(),
            feed,
            key,
            decimals,
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("label", &self.label)
            .field("key", &self.key)
            .field("decimals", &self.decimals)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationParameters {
    /// Max age in seconds before a reading is discarded
    pub stale_threshold: u64,
    pub lambda: u64,
    pub max_price_deviation: Bps,
    pub outlier_detection_enabled: bool,
    pub allow_stale_fallback: bool,
    pub aggregator_decimals: u8,
    pub paused: bool,
}

impl Default for AggregationParameters {
    fn default() -> Self {
        AggregationParameters {
            stale_threshold: 3_600,  // 1 hour
            lambda: 1_000,
            max_price_deviation: Bps::new(2_000),  // 20%
            outlier_detection_enabled: true,
            allow_stale_fallback: false,
            aggregator_decimals: 8,
            paused: false,
        }
    }
}
