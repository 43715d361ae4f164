use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Aggregation metrics
    pub static ref AGGREGATIONS_TOTAL: IntCounter = IntCounter::new(
        "aggregations_total",
        "Total number of aggregation calls"
    ).unwrap();

    pub static ref AGGREGATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("aggregation_failures_total", "Aggregation calls ending in a terminal error"),
        &["reason"]
    ).unwrap();

    pub static ref FALLBACKS_USED: IntCounter = IntCounter::new(
        "stale_fallbacks_total",
        "Aggregations answered from the newest stale reading"
    ).unwrap();

    // Source metrics
    pub static ref SOURCES_EXCLUDED: IntCounterVec = IntCounterVec::new(
        Opts::new("sources_excluded_total", "Sources dropped from an aggregation round"),
        &["reason"]
    ).unwrap();

    pub static ref OUTLIERS_REJECTED: IntCounter = IntCounter::new(
        "outliers_rejected_total",
        "Fresh readings deweighted by the outlier filter"
    ).unwrap();

    pub static ref LIVE_SOURCES: IntGauge = IntGauge::new(
        "live_sources",
        "Sources that answered in the latest round"
    ).unwrap();

    // Latency metrics
    pub static ref AGGREGATION_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "aggregation_latency_seconds",
            "Aggregation latency including provider queries"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).unwrap();
}

static REGISTER: Once = Once::new();

pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY.register(Box::new(AGGREGATIONS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(AGGREGATION_FAILURES.clone())).unwrap();
        REGISTRY.register(Box::new(FALLBACKS_USED.clone())).unwrap();
        REGISTRY.register(Box::new(SOURCES_EXCLUDED.clone())).unwrap();
        REGISTRY.register(Box::new(OUTLIERS_REJECTED.clone())).unwrap();
        REGISTRY.register(Box::new(LIVE_SOURCES.clone())).unwrap();
        REGISTRY.register(Box::new(AGGREGATION_LATENCY.clone())).unwrap();
    });
}

/// Prometheus text exposition of everything in [`REGISTRY`]
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
