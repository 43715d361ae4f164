use std::sync::Arc;
use anyhow::Context;
use PriceInfra::config::loader::{AppConfig, StaticSourceConfig};
use PriceInfra::interfaces::admin_gate::OperatorAllowList;
use PriceInfra::observability::metrics::register_metrics;
use PriceInfra::observability::tracing::init_tracing;
use PriceInfra::price_infra::aggregator::PriceAggregator;
use PriceInfra::price_infra::connectors::static_feed::StaticFeed;
use PriceInfra::price_infra::health::SourceHealth;
use PriceInfra::price_infra::registry::SourceRegistry;
use PriceInfra::price_infra::SourceDescriptor;
use PriceInfra::types::ids::{OperatorId, SourceKey};
use PriceInfra::types::timestamp::Timestamp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("PRICEINFRA_ENV").unwrap_or_else(|_| "development".to_string());
    let app = AppConfig::load(&env).context("loading configuration")?;

    init_tracing(app.log_json);
    register_metrics();

    // The binary seeds the registry as a dedicated bootstrap operator
    let bootstrap = OperatorId::new();
    let gate = Arc::new(OperatorAllowList::new(app.operators.iter().copied().chain([bootstrap])));
    let registry = Arc::new(SourceRegistry::new(app.aggregator.parameters(), gate.clone())?);

    let feed = Arc::new(StaticFeed::new());
    for source in &app.sources {
        register_static_source(&registry, bootstrap, &feed, source)?;
    }
    gate.remove_operator(bootstrap);

    let aggregator = PriceAggregator::new(registry, app.price_id)
        .with_feed_timeout(app.aggregator.feed_timeout())
        .with_health(Arc::new(SourceHealth::new(app.aggregator.failure_alert_threshold)));

    tracing::info!(
        sources = app.sources.len(),
        price_id = %app.price_id,
        env = %env,
        "Price aggregator started"
    );

    let mut ticker = tokio::time::interval(app.aggregator.poll_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                republish(&feed, &app.sources);
                match aggregator.aggregate_report().await {
                    Ok(report) => {
                        tracing::info!(
                            price = report.price.to_f64(report.decimals),
                            raw = %report.price,
                            fallback = report.used_fallback(),
                            "Aggregate price"
                        );
                        if tracing::enabled!(tracing::Level::DEBUG) {
                            match serde_json::to_string(&report) {
                                Ok(json) => tracing::debug!(report = %json, "Aggregation report"),
                                Err(e) => tracing::debug!(error = %e, "Report not serializable"),
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Aggregation failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn register_static_source(
    registry: &SourceRegistry,
    operator: OperatorId,
    feed: &Arc<StaticFeed>,
    source: &StaticSourceConfig,
) -> anyhow::Result<()> {
    let descriptor = SourceDescriptor::new(
        source.label.clone(),
        feed.clone(),
        SourceKey::new(source.sender.clone(), source.key.clone()),
        source.decimals,
    );

    match source.slot {
        Some(slot) => registry.set_slot(operator, slot, descriptor)?,
        None => registry.add_source(operator, descriptor)
            .with_context(|| format!("registering source {}", source.label))?,
    }
    Ok(())
}

/// Static sources never age: stamp every configured price with the current time.
fn republish(feed: &StaticFeed, sources: &[StaticSourceConfig]) {
    let now = Timestamp::now();
    for source in sources {
        feed.publish(&source.sender, &source.key, source.price as i128, now);
    }
}
