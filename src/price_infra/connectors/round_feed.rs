use async_trait::async_trait;
use crate::error::{FeedError, FeedResult};
use crate::interfaces::round_reader::RoundReader;
use crate::price_infra::connectors::PriceFeed;
use crate::price_infra::RawReading;

/// Adapts a round-style provider to [`PriceFeed`]. Sender and key are ignored.
pub struct RoundFeed<R> {
    reader: R,
}

impl<R: RoundReader> RoundFeed<R> {
    pub fn new(reader: R) -> Self {
        RoundFeed { reader }
    }
}

#[async_trait]
impl<R: RoundReader> PriceFeed for RoundFeed<R> {
    async fn read(&self, _sender: &str, _key: &str) -> FeedResult<RawReading> {
        let round = self.reader.latest_round_data()
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        // An answer carried over from an earlier round is not a fresh observation
        if round.answered_in_round < round.round_id {
            return Err(FeedError::Malformed(format!(
                "round {} answered in round {}",
                round.round_id, round.answered_in_round
            )));
        }

        Ok(RawReading::new(round.answer, round.updated_at))
    }
}
