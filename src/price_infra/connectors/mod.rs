pub mod static_feed;
pub mod round_feed;
pub mod structured_feed;
pub mod keyed_feed;

use async_trait::async_trait;
use crate::error::FeedResult;
use crate::price_infra::RawReading;

/// The one capability every provider is reduced to: read a timestamped price
/// for a (sender, key) sub-feed. Providers that serve a single feed ignore both.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn read(&self, sender: &str, key: &str) -> FeedResult<RawReading>;
}
