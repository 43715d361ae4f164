use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::price_infra::aggregator::PriceAggregator;
use crate::types::ids::PriceId;
use crate::types::timestamp::Timestamp;

/// Structured price answer: `price * 10^expo`, with a confidence interval.
/// `price` is as wide as [`crate::types::price::Price`], so any aggregate fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredPrice {
    pub price: u128,
    pub conf: u64,
    pub expo: i32,
    pub publish_time: Timestamp,
}

#[async_trait]
pub trait StructuredPriceReader: Send + Sync {
    async fn get_price(&self, id: &PriceId) -> Result<StructuredPrice>;
}

#[async_trait]
impl StructuredPriceReader for PriceAggregator {
    async fn get_price(&self, id: &PriceId) -> Result<StructuredPrice> {
        if *id != self.price_id() {
            return Err(Error::InvalidPriceId {
                expected: self.price_id(),
                actual: *id,
            });
        }

        let report = self.aggregate_report().await?;

        Ok(StructuredPrice {
            price: report.price.raw_value(),
            conf: 0,
            expo: -(report.decimals as i32),
            publish_time: report.computed_at,
        })
    }
}
