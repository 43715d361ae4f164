use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::price_infra::aggregator::PriceAggregator;
use crate::types::price::Price;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedPrice {
    pub price: Price,
    pub timestamp: Timestamp,
}

#[async_trait]
pub trait KeyedPriceReader: Send + Sync {
    async fn get_keyed_price(&self, sender: &str, key: &str) -> Result<KeyedPrice>;
}

#[async_trait]
impl KeyedPriceReader for PriceAggregator {
    /// `sender` and `key` are informational; the aggregate is not scoped by them.
    async fn get_keyed_price(&self, sender: &str, key: &str) -> Result<KeyedPrice> {
        tracing::trace!(sender, key, "Keyed price read");
        let report = self.aggregate_report().await?;

        Ok(KeyedPrice {
            price: report.price,
            timestamp: report.computed_at,
        })
    }
}
