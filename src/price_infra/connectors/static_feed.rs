use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use async_trait::async_trait;
use crate::error::{FeedError, FeedResult};
use crate::price_infra::connectors::PriceFeed;
use crate::price_infra::RawReading;
use crate::types::ids::SourceKey;
use crate::types::timestamp::Timestamp;

/// In-memory feed serving whatever was last published for each (sender, key).
pub struct StaticFeed {
    readings: RwLock<HashMap<SourceKey, FeedResult<RawReading>>>,
    latency: Option<Duration>,
}

impl StaticFeed {
    pub fn new() -> Self {
        StaticFeed {
            readings: RwLock::new(HashMap::new()),
            latency: None,
        }
    }

    /// Delay every read, to exercise caller-side timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn publish(&self, sender: &str, key: &str, price: i128, timestamp: Timestamp) {
        self.set(sender, key, Ok(RawReading::new(price, timestamp)));
    }

    pub fn fail(&self, sender: &str, key: &str, error: FeedError) {
        self.set(sender, key, Err(error));
    }

    pub fn clear(&self, sender: &str, key: &str) {
        if let Ok(mut readings) = self.readings.write() {
            readings.remove(&SourceKey::new(sender, key));
        }
    }

    fn set(&self, sender: &str, key: &str, value: FeedResult<RawReading>) {
        if let Ok(mut readings) = self.readings.write() {
            readings.insert(SourceKey::new(sender, key), value);
        }
    }
}

impl Default for StaticFeed {
    fn default() -> Self {
        StaticFeed::new()
    }
}

#[async_trait]
impl PriceFeed for StaticFeed {
    async fn read(&self, sender: &str, key: &str) -> FeedResult<RawReading> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let readings = self.readings.read()
            .map_err(|_| FeedError::Unavailable("feed state poisoned".to_string()))?;

        readings.get(&SourceKey::new(sender, key))
            .cloned()
            .unwrap_or_else(|| Err(FeedError::Unavailable(format!("no reading for {}/{}", sender, key))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_published_readings_per_key() {
        let feed = StaticFeed::new();
        feed.publish("oracle", "BTC", 100, Timestamp::from_secs(10));
        feed.publish("oracle", "ETH", 7, Timestamp::from_secs(11));

        assert_eq!(feed.read("oracle", "BTC").await, Ok(RawReading::new(100, Timestamp::from_secs(10))));
        assert_eq!(feed.read("oracle", "ETH").await.unwrap().price, 7);
    }

    #[tokio::test]
    async fn unknown_key_is_unavailable() {
        let feed = StaticFeed::new();
        assert!(matches!(feed.read("x", "y").await, Err(FeedError::Unavailable(_))));
    }

    #[tokio::test]
    async fn injected_failure_is_returned() {
        let feed = StaticFeed::new();
        feed.fail("a", "b", FeedError::Malformed("bad".to_string()));
        assert_eq!(feed.read("a", "b").await, Err(FeedError::Malformed("bad".to_string())));

        feed.clear("a", "b");
        assert!(matches!(feed.read("a", "b").await, Err(FeedError::Unavailable(_))));
    }
}
