//! # Fixed-Point Arithmetic Helpers
//!
//! All amounts in TIDE are integers in smallest-unit denomination. No
//! floating point. No decimals in arithmetic. Every multiply-then-divide
//! goes through the checked u128 helpers in this module so that overflow is
//! a handled error and rounding direction is always an explicit choice at
//! the call site.
//!
//! The rounding convention throughout the vault: round in the protocol's
//! favor. Minting credits rounds down, burning credits rounds up, exchange
//! rates round up. The caller eats the dust, the vault stays solvent.

use crate::config::TOKEN_DECIMALS;

/// Computes `a * b / denominator` rounding toward zero.
///
/// Returns `None` on overflow of the intermediate product or on a zero
/// denominator. The intermediate is u128, so any two u64 inputs are safe.
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    a.checked_mul(b).map(|product| product / denominator)
}

/// Computes `a * b / denominator` rounding away from zero.
///
/// Same overflow semantics as [`mul_div_floor`].
pub fn mul_div_ceil(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = a.checked_mul(b)?;
    let floor = product / denominator;
    if product % denominator == 0 {
        Some(floor)
    } else {
        floor.checked_add(1)
    }
}

/// Converts an asset amount in its native smallest units to receipt-token
/// units (8 decimals).
///
/// Assets with fewer decimals than the token scale up exactly; assets with
/// more decimals scale down with floor rounding (the sub-unit dust stays in
/// the vault's favor).
pub fn to_token_units(asset_amount: u64, asset_decimals: u8) -> Option<u64> {
    scale_units(asset_amount, asset_decimals, TOKEN_DECIMALS)
}

/// Converts a receipt-token amount back to an asset's native smallest
/// units, with floor rounding in the scale-down direction.
pub fn from_token_units(token_amount: u64, asset_decimals: u8) -> Option<u64> {
    scale_units(token_amount, TOKEN_DECIMALS, asset_decimals)
}

/// Rescales an integer amount between two decimal precisions.
fn scale_units(amount: u64, from_decimals: u8, to_decimals: u8) -> Option<u64> {
    if from_decimals == to_decimals {
        return Some(amount);
    }
    if from_decimals < to_decimals {
        let factor = 10u128.checked_pow((to_decimals - from_decimals) as u32)?;
        let scaled = (amount as u128).checked_mul(factor)?;
        u64::try_from(scaled).ok()
    } else {
        let factor = 10u128.checked_pow((from_decimals - to_decimals) as u32)?;
        u64::try_from(amount as u128 / factor).ok()
    }
}

/// Returns `true` when `value` is within `band_bps` basis points of
/// `reference` (inclusive on both edges).
///
/// This is the drift-band predicate shared by rebase and the withdrawal
/// queue's post-burn solvency check.
pub fn within_band_bps(value: u128, reference: u128, band_bps: u64) -> bool {
    let tolerance = reference
        .saturating_mul(band_bps as u128)
        .checked_div(crate::config::BPS_SCALE as u128)
        .unwrap_or(0);
    let low = reference.saturating_sub(tolerance);
    let high = reference.saturating_add(tolerance);
    value >= low && value <= high
}
