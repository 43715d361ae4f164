use crate::price_infra::{AggregationParameters, SourceReading};
use crate::types::price::Price;

/// Fewer independent samples than this make a median meaningless as a guard.
pub const MIN_OUTLIER_SAMPLES: usize = 3;

pub fn fresh_count(readings: &[SourceReading]) -> usize {
    readings.iter().filter(|r| r.is_fresh()).count()
}

/// Median of `prices`, sorting them in place. Even counts average the two middle
/// values (floored).
pub fn median(prices: &mut [Price]) -> Option<Price> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();

    let mid = prices.len() / 2;
    if prices.len() % 2 == 0 {
        Some(prices[mid - 1].midpoint(prices[mid]))
    } else {
        Some(prices[mid])
    }
}

pub fn is_active(readings: &[SourceReading], parameters: &AggregationParameters, configured: usize) -> bool {
    parameters.outlier_detection_enabled
        && configured >= MIN_OUTLIER_SAMPLES
        && fresh_count(readings) >= MIN_OUTLIER_SAMPLES
}

/// Zero the weight of every fresh reading outside the deviation band around the
/// median of fresh prices. Excluded readings stay in the list for the stale
/// fallback. Returns how many readings were rejected.
pub fn filter_outliers(
    readings: &mut [SourceReading],
    parameters: &AggregationParameters,
    configured: usize,
) -> usize {
    if !is_active(readings, parameters, configured) {
        return 0;
    }

    let mut fresh_prices: Vec<Price> = readings.iter()
        .filter(|r| r.is_fresh())
        .map(|r| r.price)
        .collect();
    let Some(median) = median(&mut fresh_prices) else {
        return 0;
    };
    let (low, high) = parameters.max_price_deviation.band_around(median);

    let mut rejected = 0;
    for reading in readings.iter_mut().filter(|r| r.is_fresh()) {
        if reading.price < low || reading.price > high {
            tracing::debug!(
                price = %reading.price,
                %median,
                %low,
                %high,
                "Outlier rejected"
            );
            reading.weight = 0;
            rejected += 1;
        }
    }

    rejected
}
