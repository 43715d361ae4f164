use async_trait::async_trait;
use crate::error::{FeedError, FeedResult};
use crate::interfaces::structured_price_reader::StructuredPriceReader;
use crate::price_infra::connectors::PriceFeed;
use crate::price_infra::normalizer::normalize;
use crate::price_infra::RawReading;
use crate::types::ids::PriceId;

/// Adapts a structured-price provider to [`PriceFeed`].
///
/// The provider reports its own exponent with every answer; the adapter
/// rescales to `decimals`, which is what the descriptor registers.
pub struct StructuredFeed<R> {
    reader: R,
    price_id: PriceId,
    decimals: u8,
}

impl<R: StructuredPriceReader> StructuredFeed<R> {
    pub fn new(reader: R, price_id: PriceId, decimals: u8) -> Self {
        StructuredFeed {
            reader,
            price_id,
            decimals,
        }
    }
}

#[async_trait]
impl<R: StructuredPriceReader> PriceFeed for StructuredFeed<R> {
    async fn read(&self, _sender: &str, _key: &str) -> FeedResult<RawReading> {
        let answer = self.reader.get_price(&self.price_id)
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        if answer.expo > 0 || answer.expo < -(u8::MAX as i32) {
            return Err(FeedError::Malformed(format!("unsupported exponent {}", answer.expo)));
        }
        let native_decimals = (-answer.expo) as u8;

        let raw = i128::try_from(answer.price)
            .map_err(|_| FeedError::Malformed(format!("price {} out of range", answer.price)))?;
        let price = normalize(raw, native_decimals, self.decimals)?;
        let price = i128::try_from(price.raw_value()).map_err(|_| FeedError::ScaleOverflow {
            from: native_decimals,
            to: self.decimals,
        })?;

        Ok(RawReading::new(price, answer.publish_time))
    }
}
