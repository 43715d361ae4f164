use std::sync::Arc;
use std::time::Duration;
use PriceInfra::error::{Error, FeedError};
use PriceInfra::interfaces::admin_gate::OperatorAllowList;
use PriceInfra::interfaces::keyed_price_reader::KeyedPriceReader;
use PriceInfra::interfaces::round_reader::RoundReader;
use PriceInfra::interfaces::structured_price_reader::StructuredPriceReader;
use PriceInfra::price_infra::aggregator::PriceAggregator;
use PriceInfra::price_infra::connectors::round_feed::RoundFeed;
use PriceInfra::price_infra::connectors::static_feed::StaticFeed;
use PriceInfra::price_infra::connectors::structured_feed::StructuredFeed;
use PriceInfra::price_infra::registry::SourceRegistry;
use PriceInfra::price_infra::{AggregationParameters, SourceDescriptor};
use PriceInfra::types::ids::{OperatorId, PriceId, SourceKey};
use PriceInfra::types::price::Price;
use PriceInfra::types::timestamp::{ManualClock, Timestamp};

const NOW: u64 = 1_700_000_000;
const PRICE_ID: PriceId = PriceId([0xe6; 32]);

struct Fixture {
    aggregator: PriceAggregator,
    feed: Arc<StaticFeed>,
    admin: OperatorId,
}

fn fixture() -> Fixture {
    let admin = OperatorId::new();
    let registry = SourceRegistry::new(
        AggregationParameters::default(),
        Arc::new(OperatorAllowList::new([admin])),
    )
    .unwrap();
    let aggregator = PriceAggregator::new(Arc::new(registry), PRICE_ID)
        .with_clock(Arc::new(ManualClock::new(Timestamp::from_secs(NOW))))
        .with_feed_timeout(Duration::from_millis(500));

    Fixture {
        aggregator,
        feed: Arc::new(StaticFeed::new()),
        admin,
    }
}

impl Fixture {
    fn source(&self, key: &str, decimals: u8, price: i128, secs_ago: u64) {
        let descriptor = SourceDescriptor::new(key, self.feed.clone(), SourceKey::new("venue", key), decimals);
        self.aggregator.registry().add_source(self.admin, descriptor).unwrap();
        self.feed.publish("venue", key, price, Timestamp::from_secs(NOW - secs_ago));
    }
}

#[tokio::test]
async fn manipulated_source_is_rejected_end_to_end() {
    let f = fixture();
    f.source("a", 8, 100_00000000, 10);
    f.source("b", 8, 102_00000000, 5);
    f.source("c", 8, 500_00000000, 1);

    let price = f.aggregator.aggregate().await.unwrap();
    assert!(price > Price::from_raw(100_00000000));
    assert!(price < Price::from_raw(102_00000000));
}

#[tokio::test]
async fn single_fresh_source_is_returned_exactly() {
    let f = fixture();
    f.source("only", 2, 123, 30);
    assert_eq!(f.aggregator.aggregate().await.unwrap(), Price::from_raw(123_000_000));
}

#[tokio::test]
async fn all_providers_failing_is_an_error_not_zero() {
    let f = fixture();
    f.source("a", 8, 100, 0);
    f.feed.fail("venue", "a", FeedError::Unavailable("connection reset".to_string()));

    assert!(matches!(f.aggregator.aggregate().await, Err(Error::NoLiveSources { configured: 1 })));
}

#[tokio::test]
async fn every_read_shape_reports_the_same_price() {
    let f = fixture();
    f.source("a", 8, 64_990_00000000, 3);
    f.source("b", 6, 65_010_000000, 8);
    f.source("c", 8, 65_000_00000000, 1);

    let price = f.aggregator.aggregate().await.unwrap();

    let round = f.aggregator.latest_round_data().await.unwrap();
    assert_eq!(round.answer, price.raw_value() as i128);
    assert_eq!((round.round_id, round.answered_in_round), (0, 0));
    assert_eq!(round.started_at, Timestamp::from_secs(NOW));
    assert_eq!(round.updated_at, Timestamp::from_secs(NOW));
    assert_eq!(f.aggregator.decimals().await, 8);

    let structured = f.aggregator.get_price(&PRICE_ID).await.unwrap();
    assert_eq!(structured.price, price.raw_value());
    assert_eq!(structured.expo, -8);
    assert_eq!(structured.conf, 0);
    assert_eq!(structured.publish_time, Timestamp::from_secs(NOW));

    let keyed = f.aggregator.get_keyed_price("anyone", "anything").await.unwrap();
    assert_eq!(keyed.price, price);
    assert_eq!(keyed.timestamp, Timestamp::from_secs(NOW));
}

#[tokio::test]
async fn read_shapes_agree_at_eighteen_decimals() {
    let f = fixture();
    f.source("a", 8, 65_000_00000000, 2);
    f.aggregator.registry().set_aggregator_decimals(f.admin, 18).unwrap();

    let expected = 65_000 * 10u128.pow(18);
    let keyed = f.aggregator.get_keyed_price("venue", "a").await.unwrap();
    assert_eq!(keyed.price, Price::from_raw(expected));

    let structured = f.aggregator.get_price(&PRICE_ID).await.unwrap();
    assert_eq!(structured.price, keyed.price.raw_value());
    assert_eq!(structured.expo, -18);

    let (round, decimals) = f.aggregator.latest_scaled_round().await.unwrap();
    assert_eq!(round.answer as u128, keyed.price.raw_value());
    assert_eq!(decimals, 18);
}

#[tokio::test]
async fn wrong_price_id_is_rejected_before_aggregating() {
    let f = fixture();
    f.aggregator.registry().pause(f.admin).unwrap();

    let err = f.aggregator.get_price(&PriceId([0; 32])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidPriceId { .. }));

    let err = f.aggregator.get_price(&PRICE_ID).await.unwrap_err();
    assert!(matches!(err, Error::Paused));
}

#[tokio::test]
async fn aggregator_can_feed_another_aggregator() {
    let upstream = fixture();
    upstream.source("a", 8, 2_000_00000000, 2);
    upstream.source("b", 8, 2_002_00000000, 4);
    let upstream_price = upstream.aggregator.aggregate().await.unwrap();
    let upstream = Arc::new(upstream);

    let downstream = fixture();
    let admin = downstream.admin;
    let registry = downstream.aggregator.registry().clone();
    registry.set_aggregator_decimals(admin, 18).unwrap();

    struct Shared(Arc<Fixture>);

    #[async_trait::async_trait]
    impl RoundReader for Shared {
        async fn decimals(&self) -> u8 {
            self.0.aggregator.decimals().await
        }

        async fn latest_round_data(&self) -> PriceInfra::error::Result<PriceInfra::interfaces::round_reader::RoundData> {
            self.0.aggregator.latest_round_data().await
        }
    }

    struct Structured(Arc<Fixture>);

    #[async_trait::async_trait]
    impl StructuredPriceReader for Structured {
        async fn get_price(&self, id: &PriceId) -> PriceInfra::error::Result<PriceInfra::interfaces::structured_price_reader::StructuredPrice> {
            self.0.aggregator.get_price(id).await
        }
    }

    registry.add_source(admin, SourceDescriptor::new(
        "round",
        Arc::new(RoundFeed::new(Shared(upstream.clone()))),
        SourceKey::new("round", ""),
        8,
    )).unwrap();
    registry.add_source(admin, SourceDescriptor::new(
        "structured",
        Arc::new(StructuredFeed::new(Structured(upstream.clone()), PRICE_ID, 8)),
        SourceKey::new("structured", ""),
        8,
    )).unwrap();

    // Both adapters report the upstream price with publish time == NOW
    let downstream_price = downstream.aggregator.aggregate().await.unwrap();
    assert_eq!(downstream_price.raw_value(), upstream_price.raw_value() * 10_000_000_000);
}
