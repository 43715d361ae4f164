use serde::{Deserialize, Serialize};
use std::fmt;
use crate::types::price::Price;

pub const BPS_DENOMINATOR: u128 = 10_000;

/// Basis points, 1 bps = 0.01%
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bps(u32);

impl Bps {
    pub const MAX: Bps = Bps(BPS_DENOMINATOR as u32);

    pub fn new(value: u32) -> Self {
        Bps(value)
    }

    pub fn raw_value(&self) -> u32 {
        self.0
    }

    /// `[median * (10000 - bps) / 10000, median * (10000 + bps) / 10000]`
    pub fn band_around(&self, median: Price) -> (Price, Price) {
        let bps = self.0 as u128;
        let low = scale(median.raw_value(), BPS_DENOMINATOR.saturating_sub(bps));
        let high = scale(median.raw_value(), BPS_DENOMINATOR + bps);
        (Price::from_raw(low), Price::from_raw(high))
    }
}

/// `value * factor / 10000`, floored, splitting `value` around the denominator so
/// that large prices do not overflow the intermediate product.
fn scale(value: u128, factor: u128) -> u128 {
    if let Some(product) = value.checked_mul(factor) {
        return product / BPS_DENOMINATOR;
    }

    let quotient = value / BPS_DENOMINATOR;
    let remainder = value % BPS_DENOMINATOR;
    quotient
        .saturating_mul(factor)
        .saturating_add(remainder * factor / BPS_DENOMINATOR)
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_twenty_percent_each_side() {
        let (low, high) = Bps::new(2_000).band_around(Price::from_raw(102_00000000));
        assert_eq!(low, Price::from_raw(81_60000000));
        assert_eq!(high, Price::from_raw(122_40000000));
    }

    #[test]
    fn zero_bps_collapses_band_to_median() {
        let median = Price::from_raw(12_345);
        assert_eq!(Bps::new(0).band_around(median), (median, median));
    }

    #[test]
    fn wide_band_saturates_low_end_at_zero() {
        let (low, _) = Bps::new(20_000).band_around(Price::from_raw(500));
        assert_eq!(low, Price::zero());
    }

    #[test]
    fn huge_median_does_not_overflow() {
        let median = Price::from_raw(u128::MAX / 2);
        let (low, high) = Bps::new(100).band_around(median);
        assert!(low < median);
        assert!(high > median);
    }
}
