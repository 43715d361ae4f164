use std::sync::Arc;
use std::time::Duration;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use serde::Serialize;
use tracing::Instrument;
use crate::error::{Error, FeedError, Result};
use crate::observability::metrics::{
    AGGREGATIONS_TOTAL, AGGREGATION_FAILURES, AGGREGATION_LATENCY, FALLBACKS_USED, LIVE_SOURCES,
    OUTLIERS_REJECTED, SOURCES_EXCLUDED,
};
use crate::observability::tracing::trace_aggregation;
use crate::price_infra::collector::{Collection, SourceCollector};
use crate::price_infra::health::SourceHealth;
use crate::price_infra::outlier::{filter_outliers, fresh_count};
use crate::price_infra::registry::SourceRegistry;
use crate::price_infra::{AggregationParameters, SourceReading};
use crate::types::ids::{PriceId, SourceKey};
use crate::types::price::Price;
use crate::types::timestamp::{Clock, SystemClock, Timestamp};

/// How the final price was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Weighted average over `contributors` fresh, non-outlier readings
    Weighted { price: Price, contributors: usize },
    /// Newest reading regardless of weight
    Fallback { price: Price, timestamp: Timestamp },
}

impl Resolution {
    pub fn price(&self) -> Price {
        match self {
            Resolution::Weighted { price, .. } => *price,
            Resolution::Fallback { price, .. } => *price,
        }
    }
}

/// `Σ(price·weight) / Σ(weight)` over readings with non-zero weight, truncated.
/// `None` when nothing carries weight.
pub fn weighted_average(readings: &[SourceReading]) -> Result<Option<Price>> {
    let mut weighted_sum = BigUint::zero();
    let mut total_weight = BigUint::zero();

    for reading in readings.iter().filter(|r| r.is_fresh()) {
        weighted_sum += BigUint::from(reading.price.raw_value()) * BigUint::from(reading.weight);
        total_weight += BigUint::from(reading.weight);
    }

    if total_weight.is_zero() {
        return Ok(None);
    }

    let average = (weighted_sum / total_weight)
        .to_u128()
        .ok_or_else(|| Error::Overflow { operation: "weighted average".to_string() })?;
    Ok(Some(Price::from_raw(average)))
}

/// Reading with the greatest timestamp; the first one in collection order wins ties.
pub fn newest_reading(readings: &[SourceReading]) -> Option<&SourceReading> {
    readings.iter().fold(None, |newest: Option<&SourceReading>, reading| match newest {
        Some(current) if current.timestamp >= reading.timestamp => Some(current),
        _ => Some(reading),
    })
}

/// Steps 2-6 of an aggregation over already collected readings. `configured` is
/// the number of sources that were queried, live or not.
pub fn compute(
    readings: &mut [SourceReading],
    parameters: &AggregationParameters,
    configured: usize,
) -> Result<Resolution> {
    if readings.is_empty() {
        return Err(Error::NoLiveSources { configured });
    }

    if fresh_count(readings) > 0 {
        filter_outliers(readings, parameters, configured);

        if let Some(price) = weighted_average(readings)? {
            return Ok(Resolution::Weighted {
                price,
                contributors: fresh_count(readings),
            });
        }
    }

    fallback(readings, parameters)
}

fn fallback(readings: &[SourceReading], parameters: &AggregationParameters) -> Result<Resolution> {
    if !parameters.allow_stale_fallback {
        return Err(Error::AllSourcesStale);
    }

    newest_reading(readings)
        .map(|newest| Resolution::Fallback {
            price: newest.price,
            timestamp: newest.timestamp,
        })
        .ok_or(Error::NoLiveSources { configured: readings.len() })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SourceStatus {
    Included,
    Stale,
    Outlier,
    Failed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceOutcome {
    pub label: String,
    pub key: SourceKey,
    pub status: SourceStatus,
    pub reading: Option<SourceReading>,
}

/// Result of one aggregation plus what happened to each source along the way.
#[derive(Clone, Debug, Serialize)]
pub struct AggregationReport {
    pub price: Price,
    pub decimals: u8,
    pub computed_at: Timestamp,
    pub resolution: Resolution,
    pub sources: Vec<SourceOutcome>,
}

impl AggregationReport {
    pub fn used_fallback(&self) -> bool {
        matches!(self.resolution, Resolution::Fallback { .. })
    }
}

/// Run [`compute`] over a collection and annotate every source with its fate.
pub fn aggregate_collection(
    collection: &Collection,
    parameters: &AggregationParameters,
    now: Timestamp,
) -> Result<AggregationReport> {
    let mut readings = collection.readings();
    let fresh_before: Vec<bool> = readings.iter().map(|r| r.is_fresh()).collect();

    let resolution = compute(&mut readings, parameters, collection.configured())?;

    let mut sources: Vec<SourceOutcome> = collection.samples.iter()
        .map(|sample| SourceOutcome {
            label: sample.label.clone(),
            key: sample.key.clone(),
            status: match &sample.outcome {
                Ok(_) => SourceStatus::Included,
                Err(e) => SourceStatus::from(e),
            },
            reading: sample.outcome.as_ref().ok().copied(),
        })
        .collect();

    // `readings` holds exactly the successful samples, in the same order
    let survivors = sources.iter_mut().filter(|source| source.reading.is_some());
    for (source, (reading, was_fresh)) in survivors.zip(readings.iter().zip(fresh_before)) {
        source.status = if reading.is_fresh() {
            SourceStatus::Included
        } else if was_fresh {
            SourceStatus::Outlier
        } else {
            SourceStatus::Stale
        };
        source.reading = Some(*reading);
    }

    Ok(AggregationReport {
        price: resolution.price(),
        decimals: parameters.aggregator_decimals,
        computed_at: now,
        resolution,
        sources,
    })
}

/// Aggregation service: snapshots the registry, queries every source, and
/// reduces the answers to one price. Holds no state between calls apart from
/// diagnostics.
pub struct PriceAggregator {
    registry: Arc<SourceRegistry>,
    collector: SourceCollector,
    clock: Arc<dyn Clock>,
    price_id: PriceId,
    health: Arc<SourceHealth>,
}

impl PriceAggregator {
    pub fn new(registry: Arc<SourceRegistry>, price_id: PriceId) -> Self {
        PriceAggregator {
            registry,
            collector: SourceCollector::new(Duration::from_secs(2)),
            clock: Arc::new(SystemClock),
            price_id,
            health: Arc::new(SourceHealth::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_feed_timeout(mut self, feed_timeout: Duration) -> Self {
        self.collector = SourceCollector::new(feed_timeout);
        self
    }

    pub fn with_health(mut self, health: Arc<SourceHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn price_id(&self) -> PriceId {
        self.price_id
    }

    pub fn health(&self) -> &SourceHealth {
        &self.health
    }

    pub async fn aggregate(&self) -> Result<Price> {
        self.aggregate_report().await.map(|report| report.price)
    }

    pub async fn aggregate_report(&self) -> Result<AggregationReport> {
        let _timer = AGGREGATION_LATENCY.start_timer();
        AGGREGATIONS_TOTAL.inc();

        let snapshot = self.registry.snapshot();
        let span = trace_aggregation(snapshot.source_count());

        let result: Result<AggregationReport> = async {
            let parameters = snapshot.parameters();
            if parameters.paused {
                return Err(Error::Paused);
            }

            let now = self.clock.now();
            let collection = self.collector.collect(&snapshot, now).await;
            self.health.record(&collection, now);
            record_collection(&collection);

            let report = aggregate_collection(&collection, parameters, now)?;
            record_report(&report);
            Ok(report)
        }
        .instrument(span)
        .await;

        if let Err(e) = &result {
            AGGREGATION_FAILURES.with_label_values(&[failure_reason(e)]).inc();
            tracing::warn!(error = %e, "Aggregation failed");
        }
        result
    }
}

fn record_collection(collection: &Collection) {
    LIVE_SOURCES.set(collection.live_count() as i64);
    for (_, error) in collection.failures() {
        SOURCES_EXCLUDED.with_label_values(&[error.kind()]).inc();
    }
}

fn record_report(report: &AggregationReport) {
    for outcome in &report.sources {
        match outcome.status {
            SourceStatus::Stale => SOURCES_EXCLUDED.with_label_values(&["stale"]).inc(),
            SourceStatus::Outlier => {
                SOURCES_EXCLUDED.with_label_values(&["outlier"]).inc();
                OUTLIERS_REJECTED.inc();
            }
            _ => {}
        }
    }

    match report.resolution {
        Resolution::Fallback { timestamp, .. } => {
            FALLBACKS_USED.inc();
            tracing::warn!(price = %report.price, %timestamp, "No fresh readings, answered from newest stale reading");
        }
        Resolution::Weighted { contributors, .. } => {
            tracing::debug!(price = %report.price, contributors, "Aggregated");
        }
    }
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::Paused => "paused",
        Error::NoLiveSources { .. } => "no_live_sources",
        Error::AllSourcesStale => "all_stale",
        _ => "other",
    }
}

impl From<&FeedError> for SourceStatus {
    fn from(error: &FeedError) -> Self {
        SourceStatus::Failed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::admin_gate::OperatorAllowList;
    use crate::price_infra::connectors::static_feed::StaticFeed;
    use crate::price_infra::registry::Slot;
    use crate::price_infra::SourceDescriptor;
    use crate::types::bps::Bps;
    use crate::types::ids::{OperatorId, SourceKey};
    use crate::types::timestamp::ManualClock;

    const NOW: u64 = 1_700_000_000;

    fn reading(price: u128, weight: u128, timestamp: u64) -> SourceReading {
        SourceReading {
            price: Price::from_raw(price),
            weight,
            timestamp: Timestamp::from_secs(timestamp),
        }
    }

    fn with_fallback(allow: bool) -> AggregationParameters {
        AggregationParameters {
            allow_stale_fallback: allow,
            ..AggregationParameters::default()
        }
    }

    #[test]
    fn weighted_average_truncates() {
        let readings = [reading(10, 1, 1), reading(11, 2, 1)];
        // (10 + 22) / 3 = 10.67
        assert_eq!(weighted_average(&readings).unwrap(), Some(Price::from_raw(10)));
    }

    #[test]
    fn weighted_average_ignores_zero_weight() {
        let readings = [reading(10, 3, 1), reading(1_000_000, 0, 1)];
        assert_eq!(weighted_average(&readings).unwrap(), Some(Price::from_raw(10)));
        assert_eq!(weighted_average(&[reading(5, 0, 1)]).unwrap(), None);
    }

    #[test]
    fn weighted_average_handles_products_beyond_u128() {
        let readings = [reading(u128::MAX, u128::MAX, 1), reading(u128::MAX, 1, 1)];
        assert_eq!(weighted_average(&readings).unwrap(), Some(Price::from_raw(u128::MAX)));
    }

    #[test]
    fn newest_reading_prefers_first_on_ties() {
        let readings = [reading(1, 0, 50), reading(2, 0, 70), reading(3, 0, 70), reading(4, 0, 60)];
        assert_eq!(newest_reading(&readings).unwrap().price, Price::from_raw(2));
        assert!(newest_reading(&[]).is_none());
    }

    #[test]
    fn outlier_scenario_averages_remaining_two() {
        let mut readings = vec![
            reading(100_00000000, 990_099, NOW - 10),
            reading(102_00000000, 995_024, NOW - 5),
            reading(500_00000000, 999_000, NOW - 1),
        ];

        let resolution = compute(&mut readings, &AggregationParameters::default(), 3).unwrap();
        let Resolution::Weighted { price, contributors } = resolution else {
            panic!("expected weighted resolution, got {:?}", resolution);
        };
        assert_eq!(contributors, 2);
        assert!(price > Price::from_raw(100_00000000));
        assert!(price < Price::from_raw(102_00000000));

        let expected = (100_00000000u128 * 990_099 + 102_00000000u128 * 995_024) / (990_099 + 995_024);
        assert_eq!(price.raw_value(), expected);
    }

    #[test]
    fn all_stale_without_fallback_fails() {
        let mut readings = vec![reading(100, 0, 10), reading(200, 0, 20)];
        assert!(matches!(compute(&mut readings, &with_fallback(false), 2), Err(Error::AllSourcesStale)));
    }

    #[test]
    fn all_stale_with_fallback_returns_newest() {
        let mut readings = vec![reading(100, 0, 10), reading(200, 0, 30), reading(300, 0, 20)];
        let resolution = compute(&mut readings, &with_fallback(true), 3).unwrap();
        assert_eq!(resolution, Resolution::Fallback {
            price: Price::from_raw(200),
            timestamp: Timestamp::from_secs(30),
        });
    }

    #[test]
    fn no_readings_is_no_live_sources() {
        assert!(matches!(
            compute(&mut [], &with_fallback(true), 4),
            Err(Error::NoLiveSources { configured: 4 })
        ));
    }

    #[test]
    fn filter_wiping_everything_falls_back() {
        // Even median of two clusters with a zero-width band rejects every reading
        let mut readings = vec![
            reading(100, 5, 10),
            reading(100, 5, 11),
            reading(200, 5, 13),
            reading(200, 5, 12),
        ];
        let parameters = AggregationParameters {
            max_price_deviation: Bps::new(0),
            ..with_fallback(true)
        };
        let resolution = compute(&mut readings, &parameters, 4).unwrap();
        assert_eq!(resolution.price(), Price::from_raw(200));
        assert!(readings.iter().all(|r| !r.is_fresh()));

        let parameters = AggregationParameters {
            max_price_deviation: Bps::new(0),
            ..with_fallback(false)
        };
        let mut readings = vec![reading(100, 5, 10), reading(100, 5, 11), reading(200, 5, 13), reading(200, 5, 12)];
        assert!(matches!(compute(&mut readings, &parameters, 4), Err(Error::AllSourcesStale)));
    }

    #[test]
    fn single_source_returns_its_price() {
        let mut readings = vec![reading(123_000_000, 7, NOW)];
        assert_eq!(compute(&mut readings, &AggregationParameters::default(), 1).unwrap().price(), Price::from_raw(123_000_000));
    }

    struct Harness {
        aggregator: PriceAggregator,
        feed: Arc<StaticFeed>,
        clock: Arc<ManualClock>,
        admin: OperatorId,
    }

    fn harness(parameters: AggregationParameters) -> Harness {
        let admin = OperatorId::new();
        let registry = Arc::new(
            SourceRegistry::new(parameters, Arc::new(OperatorAllowList::new([admin]))).unwrap(),
        );
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(NOW)));
        let aggregator = PriceAggregator::new(registry, PriceId([7; 32]))
            .with_clock(clock.clone())
            .with_feed_timeout(Duration::from_millis(200));

        Harness {
            aggregator,
            feed: Arc::new(StaticFeed::new()),
            clock,
            admin,
        }
    }

    impl Harness {
        fn add(&self, key: &str, decimals: u8) {
            let descriptor = SourceDescriptor::new(key, self.feed.clone(), SourceKey::new("oracle", key), decimals);
            self.aggregator.registry().add_source(self.admin, descriptor).unwrap();
        }

        fn publish(&self, key: &str, price: i128, secs_ago: u64) {
            self.feed.publish("oracle", key, price, Timestamp::from_secs(NOW - secs_ago));
        }
    }

    #[tokio::test]
    async fn paused_aggregator_refuses_to_answer() {
        let h = harness(AggregationParameters::default());
        h.add("a", 8);
        h.publish("a", 100, 0);
        h.aggregator.registry().pause(h.admin).unwrap();

        assert!(matches!(h.aggregator.aggregate().await, Err(Error::Paused)));

        h.aggregator.registry().unpause(h.admin).unwrap();
        assert_eq!(h.aggregator.aggregate().await.unwrap(), Price::from_raw(100));
    }

    #[tokio::test]
    async fn empty_registry_is_no_live_sources() {
        let h = harness(with_fallback(true));
        assert!(matches!(h.aggregator.aggregate().await, Err(Error::NoLiveSources { configured: 0 })));
    }

    #[tokio::test]
    async fn every_call_failing_is_no_live_sources() {
        let h = harness(with_fallback(true));
        h.add("a", 8);
        h.add("b", 8);
        h.feed.fail("oracle", "a", FeedError::Malformed("truncated".to_string()));
        h.publish("b", -1, 0);

        assert!(matches!(h.aggregator.aggregate().await, Err(Error::NoLiveSources { configured: 2 })));
        assert_eq!(h.aggregator.health().get(&SourceKey::new("oracle", "a")).unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn report_labels_each_source() {
        let h = harness(with_fallback(false));
        for key in ["a", "b", "c", "stale", "broken"] {
            h.add(key, 8);
        }
        h.publish("a", 100_00000000, 10);
        h.publish("b", 102_00000000, 5);
        h.publish("c", 500_00000000, 1);
        h.publish("stale", 101_00000000, 7_200);

        let report = h.aggregator.aggregate_report().await.unwrap();
        let statuses: Vec<SourceStatus> = report.sources.iter().map(|s| s.status.clone()).collect();
        assert_eq!(statuses[..4], [
            SourceStatus::Included,
            SourceStatus::Included,
            SourceStatus::Outlier,
            SourceStatus::Stale,
        ]);
        assert!(matches!(statuses[4], SourceStatus::Failed(_)));
        assert!(!report.used_fallback());
        assert_eq!(report.computed_at, Timestamp::from_secs(NOW));
        assert_eq!(report.decimals, 8);
    }

    #[tokio::test]
    async fn stale_sources_fall_back_to_newest_when_allowed() {
        let h = harness(with_fallback(true));
        h.add("old", 8);
        h.add("older", 8);
        h.publish("old", 105, 4_000);
        h.publish("older", 99, 5_000);

        let report = h.aggregator.aggregate_report().await.unwrap();
        assert!(report.used_fallback());
        assert_eq!(report.price, Price::from_raw(105));

        h.aggregator.registry().set_allow_stale_fallback(h.admin, false).unwrap();
        assert!(matches!(h.aggregator.aggregate().await, Err(Error::AllSourcesStale)));
    }

    #[tokio::test]
    async fn slot_reusing_a_registered_key_is_not_double_counted() {
        let h = harness(AggregationParameters::default());
        h.add("a", 8);
        h.add("b", 8);
        h.publish("a", 100, 0);
        h.publish("b", 200, 0);

        let twin = SourceDescriptor::new("twin", h.feed.clone(), SourceKey::new("oracle", "a"), 8);
        let err = h.aggregator.registry().set_slot(h.admin, Slot::Primary, twin).unwrap_err();
        assert!(matches!(err, Error::DuplicateSource(_)));

        // Two sources stay below the outlier gate and average evenly
        assert_eq!(h.aggregator.registry().snapshot().source_count(), 2);
        assert_eq!(h.aggregator.aggregate().await.unwrap(), Price::from_raw(150));
    }

    #[tokio::test]
    async fn removed_source_drops_out_of_health() {
        let h = harness(AggregationParameters::default());
        h.add("a", 8);
        h.add("b", 8);
        h.publish("b", 100, 0);
        let _ = h.aggregator.aggregate().await;
        let a = SourceKey::new("oracle", "a");
        assert!(h.aggregator.health().get(&a).is_some());

        h.aggregator.registry().remove_source(h.admin, &a).unwrap();
        h.aggregator.aggregate().await.unwrap();
        assert!(h.aggregator.health().get(&a).is_none());
        assert!(h.aggregator.health().get(&SourceKey::new("oracle", "b")).unwrap().is_healthy());
    }

    #[tokio::test]
    async fn primary_slot_wins_fallback_ties() {
        let h = harness(with_fallback(true));
        h.add("registered", 8);
        h.publish("registered", 200, 4_000);

        let primary = Arc::new(StaticFeed::new());
        primary.publish("", "", 100, Timestamp::from_secs(NOW - 4_000));
        h.aggregator.registry()
            .set_slot(h.admin, Slot::Primary, SourceDescriptor::new("primary", primary, SourceKey::default(), 8))
            .unwrap();

        assert_eq!(h.aggregator.aggregate().await.unwrap(), Price::from_raw(100));
    }

    #[tokio::test]
    async fn mixed_decimals_are_normalized_before_averaging() {
        let h = harness(AggregationParameters::default());
        h.add("two", 2);
        h.add("eighteen", 18);
        h.publish("two", 123, 0);
        h.publish("eighteen", 1_230_000_000_000_000_000, 0);

        assert_eq!(h.aggregator.aggregate().await.unwrap(), Price::from_raw(123_000_000));
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let h = harness(AggregationParameters::default());
        for (key, price, age) in [("a", 100_00000000, 30), ("b", 101_00000000, 3), ("c", 99_00000000, 300)] {
            h.add(key, 8);
            h.publish(key, price, age);
        }

        let first = h.aggregator.aggregate().await.unwrap();
        let second = h.aggregator.aggregate().await.unwrap();
        assert_eq!(first, second);

        h.clock.advance(60);
        let later = h.aggregator.aggregate().await.unwrap();
        assert!(later >= Price::from_raw(99_00000000) && later <= Price::from_raw(101_00000000));
    }
}
