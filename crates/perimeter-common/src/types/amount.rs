//! Basis-point arithmetic on base-unit amounts
//!
//! Amounts are whole base units of an asset carried as [`Decimal`]; any
//! fractional result of a rate calculation is rounded down.

use rust_decimal::Decimal;

/// 100% expressed in basis points
pub const BPS_DENOMINATOR: u32 = 10_000;

/// `amount × bps / 10_000`, rounded down to base units
#[inline]
pub fn bps_of(amount: Decimal, bps: u32) -> Decimal {
    (amount * Decimal::from(bps) / Decimal::from(BPS_DENOMINATOR)).floor()
}
