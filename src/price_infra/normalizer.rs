use num_traits::checked_pow;
use crate::error::{FeedError, FeedResult};
use crate::types::price::Price;

/// Largest exponent for which `10^n` fits in a `u128`.
pub const MAX_POW10_EXPONENT: u8 = 38;

/// `10^exp`, or `None` past `MAX_POW10_EXPONENT`.
pub fn pow10(exp: u8) -> Option<u128> {
    checked_pow(10u128, exp as usize)
}

/// Rescale a provider's raw price from `source_decimals` to `target_decimals`.
///
/// Upscaling multiplies by `10^(target - source)`. Downscaling integer-divides by
/// `10^(source - target)` and truncates the dropped digits.
pub fn normalize(raw: i128, source_decimals: u8, target_decimals: u8) -> FeedResult<Price> {
    if raw < 0 {
        return Err(FeedError::NegativePrice(raw));
    }
    let value = raw as u128;

    let overflow = FeedError::ScaleOverflow {
        from: source_decimals,
        to: target_decimals,
    };

    let scaled = if source_decimals < target_decimals {
        let factor = pow10(target_decimals - source_decimals).ok_or(overflow.clone())?;
        value.checked_mul(factor).ok_or(overflow)?
    } else if source_decimals > target_decimals {
        match pow10(source_decimals - target_decimals) {
            Some(factor) => value / factor,
            // 10^39 and beyond exceed any u128 value
            None => 0,
        }
    } else {
        value
    };

    Ok(Price::from_raw(scaled))
}
