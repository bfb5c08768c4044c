//! Fixed-point money helpers
//!
//! Money is `Decimal` everywhere it is stored or returned. Statistical code
//! works in `f64` and converts back through these helpers, which round to two
//! decimal places.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for every persisted amount
pub const MONEY_DP: u32 = 2;

/// Round half away from zero to two places
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate toward negative infinity at two places
///
/// Used where rounding up could breach a cap.
pub fn floor_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToNegativeInfinity)
}

/// Convert a statistical result back into money; non-finite values become zero
pub fn from_f64(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).map(round_money).unwrap_or_default()
}

/// Like [`from_f64`] but never rounds up
pub fn from_f64_floor(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).map(floor_money).unwrap_or_default()
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Round a ratio or score to two places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
