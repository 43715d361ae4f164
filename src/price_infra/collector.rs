use std::time::Duration;
use futures_util::future::join_all;
use tokio::time::timeout;
use crate::error::{FeedError, FeedResult};
use crate::price_infra::freshness::weight;
use crate::price_infra::normalizer::normalize;
use crate::price_infra::registry::RegistrySnapshot;
use crate::price_infra::{AggregationParameters, RawReading, SourceDescriptor, SourceReading};
use crate::types::ids::SourceKey;
use crate::types::timestamp::Timestamp;

/// Outcome of querying one configured source, in collection order.
#[derive(Clone, Debug)]
pub struct SourceSample {
    pub label: String,
    pub key: SourceKey,
    pub outcome: FeedResult<SourceReading>,
}

/// Every configured source's outcome for one round.
#[derive(Clone, Debug, Default)]
pub struct Collection {
    pub samples: Vec<SourceSample>,
}

impl Collection {
    pub fn configured(&self) -> usize {
        self.samples.len()
    }

    /// Surviving readings, in collection order
    pub fn readings(&self) -> Vec<SourceReading> {
        self.samples.iter()
            .filter_map(|s| s.outcome.as_ref().ok().copied())
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.samples.iter().filter(|s| s.outcome.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FeedError)> {
        self.samples.iter()
            .filter_map(|s| s.outcome.as_ref().err().map(|e| (s.label.as_str(), e)))
    }
}

/// Normalize and weight one provider answer. A failed call, a negative price and
/// a rescale overflow all end up as the same kind of exclusion.
pub fn to_reading(
    outcome: FeedResult<RawReading>,
    source_decimals: u8,
    parameters: &AggregationParameters,
    now: Timestamp,
) -> FeedResult<SourceReading> {
    let raw = outcome?;
    let price = normalize(raw.price, source_decimals, parameters.aggregator_decimals)?;

    Ok(SourceReading {
        price,
        weight: weight(raw.timestamp, now, parameters.stale_threshold, parameters.lambda),
        timestamp: raw.timestamp,
    })
}

/// Fold raw provider outcomes into a [`Collection`]. Pure: the result depends
/// only on its arguments, whatever order the queries completed in.
pub fn fold_outcomes<'a>(
    outcomes: impl IntoIterator<Item = (&'a SourceDescriptor, FeedResult<RawReading>)>,
    parameters: &AggregationParameters,
    now: Timestamp,
) -> Collection {
    let samples = outcomes.into_iter()
        .map(|(descriptor, outcome)| {
            let outcome = to_reading(outcome, descriptor.decimals, parameters, now);
            if let Err(e) = &outcome {
                tracing::debug!(source = %descriptor.label, error = %e, "Source excluded from round");
            }
            SourceSample {
                label: descriptor.label.clone(),
                key: descriptor.key.clone(),
                outcome,
            }
        })
        .collect();

    Collection { samples }
}

/// Queries every source of a registry snapshot concurrently, each bounded by
/// `feed_timeout`.
pub struct SourceCollector {
    feed_timeout: Duration,
}

impl SourceCollector {
    pub fn new(feed_timeout: Duration) -> Self {
        SourceCollector { feed_timeout }
    }

    pub fn feed_timeout(&self) -> Duration {
        self.feed_timeout
    }

    pub async fn collect(&self, snapshot: &RegistrySnapshot, now: Timestamp) -> Collection {
        let descriptors: Vec<&SourceDescriptor> = snapshot.sources().collect();

        let queries = descriptors.iter().map(|descriptor| async move {
            let query = descriptor.feed.read(&descriptor.key.sender, &descriptor.key.key);
            match timeout(self.feed_timeout, query).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FeedError::Timeout(self.feed_timeout)),
            }
        });
        // join_all keeps input order, so slot i always belongs to descriptor i
        let outcomes = join_all(queries).await;

        fold_outcomes(
            descriptors.into_iter().zip(outcomes),
            snapshot.parameters(),
            now,
        )
    }
}
