use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::price_infra::aggregator::PriceAggregator;
use crate::types::timestamp::Timestamp;

/// Round-style answer: `(round_id, answer, started_at, updated_at, answered_in_round)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: i128,
    pub started_at: Timestamp,
    pub updated_at: Timestamp,
    pub answered_in_round: u128,
}

/// `decimals` and `latest_round_data` are separate reads; a decimals change in
/// between pairs an answer with the wrong scale. Use `latest_scaled_round` when
/// both are needed.
#[async_trait]
pub trait RoundReader: Send + Sync {
    async fn decimals(&self) -> u8;
    async fn latest_round_data(&self) -> Result<RoundData>;

    /// Latest round together with the scale its answer is expressed in
    async fn latest_scaled_round(&self) -> Result<(RoundData, u8)> {
        let decimals = self.decimals().await;
        Ok((self.latest_round_data().await?, decimals))
    }
}

#[async_trait]
impl RoundReader for PriceAggregator {
    async fn decimals(&self) -> u8 {
        self.registry().snapshot().parameters().aggregator_decimals
    }

    /// The aggregate has no rounds: ids are always zero and both times are "now".
    async fn latest_round_data(&self) -> Result<RoundData> {
        self.latest_scaled_round().await.map(|(round, _)| round)
    }

    /// Answer and decimals come from the same registry snapshot.
    async fn latest_scaled_round(&self) -> Result<(RoundData, u8)> {
        let report = self.aggregate_report().await?;
        let answer = i128::try_from(report.price.raw_value())
            .map_err(|_| Error::Overflow { operation: "round answer".to_string() })?;

        let round = RoundData {
            round_id: 0,
            answer,
            started_at: report.computed_at,
            updated_at: report.computed_at,
            answered_in_round: 0,
        };
        Ok((round, report.decimals))
    }
}
