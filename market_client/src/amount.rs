//! Stablecoin amount codec
//!
//! The token uses 6 decimals on chain. Human amounts are `Decimal` values,
//! on-chain amounts are `U256` base units.

use std::str::FromStr;

use ethereum_types::U256;
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::AmountError;

/// Decimal places of the stablecoin
pub const USDC_DECIMALS: u32 = 6;

/// Largest base-unit value that still fits a `Decimal` mantissa
const DECIMAL_MANTISSA_BITS: usize = 96;

/// Convert a human amount to base units, truncating toward zero.
///
/// Negative amounts become zero; callers validate `amount > 0` first.
pub fn to_base_units(amount: Decimal) -> U256 {
    if amount.is_sign_negative() || amount.is_zero() {
        return U256::zero();
    }

    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    if scale <= USDC_DECIMALS {
        mantissa * U256::exp10((USDC_DECIMALS - scale) as usize)
    } else {
        mantissa / U256::exp10((scale - USDC_DECIMALS) as usize)
    }
}

/// Convert base units to a human amount without rounding.
///
/// Values wider than a `Decimal` mantissa saturate to `Decimal::MAX`.
pub fn from_base_units(amount: U256) -> Decimal {
    if amount.bits() > DECIMAL_MANTISSA_BITS {
        warn!(base_units = %amount, "Amount exceeds decimal range, saturating");
        return Decimal::MAX;
    }
    Decimal::from_i128_with_scale(amount.low_u128() as i128, USDC_DECIMALS)
}

/// Parse user input such as `"12.5"` into an amount
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str(input.trim()).map_err(|_| AmountError::NotNumeric(input.to_string()))
}
