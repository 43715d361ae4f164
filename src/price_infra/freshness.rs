use crate::price_infra::Weight;
use crate::types::timestamp::Timestamp;

pub const DECAY_NUMERATOR: u128 = 1_000_000_000_000;  // 1e12
pub const DECAY_BASE: u128 = 1_000_000;  // 1e6

/// `1e12 / (1e6 + lambda * elapsed)`: an integer stand-in for exponential decay.
/// Strictly non-increasing in `elapsed` and floored at 1, so only the stale
/// cutoff in [`weight`] ever produces a hard zero.
pub fn decay(elapsed: u64, lambda: u64) -> Weight {
    let denominator = DECAY_BASE.saturating_add((lambda as u128).saturating_mul(elapsed as u128));
    (DECAY_NUMERATOR / denominator).max(1)
}

/// Freshness weight of a reading observed at `timestamp`.
///
/// Zero if the timestamp is unset, in the future, or older than `stale_threshold`.
pub fn weight(timestamp: Timestamp, now: Timestamp, stale_threshold: u64, lambda: u64) -> Weight {
    if timestamp.is_unset() {
        return 0;
    }

    match timestamp.age_at(now) {
        Some(elapsed) if elapsed <= stale_threshold => decay(elapsed, lambda),
        _ => 0,
    }
}
