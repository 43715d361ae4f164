use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::price_infra::AggregationParameters;
use crate::types::bps::Bps;
use crate::MAX_AGGREGATOR_DECIMALS;

pub mod loader;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub stale_threshold_secs: u64,
    pub lambda: u64,
    pub max_price_deviation_bps: u32,
    pub outlier_detection_enabled: bool,
    pub allow_stale_fallback: bool,
    pub aggregator_decimals: u8,
    pub start_paused: bool,
    pub feed_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub failure_alert_threshold: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        let parameters = AggregationParameters::default();
        AggregatorConfig {
            stale_threshold_secs: parameters.stale_threshold,
            lambda: parameters.lambda,
            max_price_deviation_bps: parameters.max_price_deviation.raw_value(),
            outlier_detection_enabled: parameters.outlier_detection_enabled,
            allow_stale_fallback: parameters.allow_stale_fallback,
            aggregator_decimals: parameters.aggregator_decimals,
            start_paused: false,
            feed_timeout_ms: 2_000,
            poll_interval_ms: 5_000,
            failure_alert_threshold: 5,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.aggregator_decimals > MAX_AGGREGATOR_DECIMALS {
            return Err(Error::DecimalOverflow {
                decimals: self.aggregator_decimals,
                max: MAX_AGGREGATOR_DECIMALS,
            });
        }
        if self.feed_timeout_ms == 0 {
            return Err(Error::ConfigError("feed_timeout_ms must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::ConfigError("poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn parameters(&self) -> AggregationParameters {
        AggregationParameters {
            stale_threshold: self.stale_threshold_secs,
            lambda: self.lambda,
            max_price_deviation: Bps::new(self.max_price_deviation_bps),
            outlier_detection_enabled: self.outlier_detection_enabled,
            allow_stale_fallback: self.allow_stale_fallback,
            aggregator_decimals: self.aggregator_decimals,
            paused: self.start_paused,
        }
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_millis(self.feed_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
