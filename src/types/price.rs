use serde::{Deserialize, Serialize};
use std::fmt;

/// Unsigned fixed-point price at the aggregator's configured output decimals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u128);

impl Price {
    pub fn from_raw(value: u128) -> Self {
        Price(value)
    }

    pub fn raw_value(&self) -> u128 {
        self.0
    }

    pub fn zero() -> Self {
        Price(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert to f64 for display purposes only
    pub fn to_f64(&self, decimals: u8) -> f64 {
        self.0 as f64 / 10f64.powi(decimals as i32)
    }

    /// Floor of the midpoint, without overflowing on large operands
    pub fn midpoint(self, other: Price) -> Price {
        Price(self.0 / 2 + other.0 / 2 + (self.0 % 2 + other.0 % 2) / 2)
    }
}

impl From<u128> for Price {
    fn from(value: u128) -> Self {
        Price(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
