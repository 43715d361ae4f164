use async_trait::async_trait;
use crate::error::{FeedError, FeedResult};
use crate::interfaces::keyed_price_reader::KeyedPriceReader;
use crate::price_infra::connectors::PriceFeed;
use crate::price_infra::RawReading;

/// Adapts a keyed provider to [`PriceFeed`], passing sender and key through.
pub struct KeyedFeed<R> {
    reader: R,
}

impl<R: KeyedPriceReader> KeyedFeed<R> {
    pub fn new(reader: R) -> Self {
        KeyedFeed { reader }
    }
}

#[async_trait]
impl<R: KeyedPriceReader> PriceFeed for KeyedFeed<R> {
    async fn read(&self, sender: &str, key: &str) -> FeedResult<RawReading> {
        let answer = self.reader.get_keyed_price(sender, key)
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        let price = i128::try_from(answer.price.raw_value())
            .map_err(|_| FeedError::Malformed(format!("price {} out of range", answer.price)))?;

        Ok(RawReading::new(price, answer.timestamp))
    }
}
