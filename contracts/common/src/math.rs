//! Mathematical Utilities for the YieldVault core
//!
//! Checked fixed-point helpers and the share <-> asset exchange rate.
//!
//! Rounding always works against the party performing the action: what a
//! caller receives is rounded down, what a caller pays is rounded up.

use crate::constants::{bps, precision, time};
use crate::errors::{VaultError, VaultResult};

/// Rounding direction for integer division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero
    Up,
}

/// Calculate `a * b / denominator` in u128 with explicit rounding
pub fn mul_div(a: u64, b: u64, denominator: u64, rounding: Rounding) -> VaultResult<u64> {
    if denominator == 0 {
        return Err(VaultError::DivisionByZero);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(VaultError::Overflow)?;
    let denominator = denominator as u128;
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != 0 {
        quotient += 1;
    }
    u64::try_from(quotient).map_err(|_| VaultError::Overflow)
}

/// Convert an asset amount into shares
///
/// shares = total_shares == 0 ? assets : assets * total_shares / total_assets
///
/// # Errors
/// `SharesWithoutAssets` when shares exist but the vault holds no assets.
/// No rate can be priced from that state, so it is terminal for deposits.
pub fn convert_to_shares(
    assets: u64,
    total_shares: u64,
    total_assets: u64,
    rounding: Rounding,
) -> VaultResult<u64> {
    if total_shares == 0 {
        return Ok(assets);
    }
    if total_assets == 0 {
        return Err(VaultError::SharesWithoutAssets { total_shares });
    }
    mul_div(assets, total_shares, total_assets, rounding)
}

/// Convert a share amount into assets
///
/// assets = total_shares == 0 ? shares : shares * total_assets / total_shares
pub fn convert_to_assets(
    shares: u64,
    total_shares: u64,
    total_assets: u64,
    rounding: Rounding,
) -> VaultResult<u64> {
    if total_shares == 0 {
        return Ok(shares);
    }
    mul_div(shares, total_assets, total_shares, rounding)
}

/// Apply a basis-point rate, rounding down
pub fn apply_bps(amount: u64, rate_bps: u64) -> VaultResult<u64> {
    mul_div(amount, rate_bps, bps::DENOMINATOR, Rounding::Down)
}

/// Loss between two asset observations in basis points
///
/// Returns `None` when `current >= previous` (gains never count) or when
/// there was nothing to lose.
pub fn loss_bps(previous: u64, current: u64) -> Option<u64> {
    if previous == 0 || current >= previous {
        return None;
    }
    let loss = (previous - current) as u128 * bps::DENOMINATOR as u128 / previous as u128;
    Some(loss as u64)
}

/// Assets per share scaled by `PRICE_SCALE`; 1.0 for an empty vault
pub fn share_price(total_assets: u64, total_shares: u64) -> u128 {
    if total_shares == 0 {
        return precision::PRICE_SCALE;
    }
    (total_assets as u128).saturating_mul(precision::PRICE_SCALE) / total_shares as u128
}

/// Signed change between two prices in basis points
pub fn price_change_bps(from: u128, to: u128) -> i64 {
    if from == 0 {
        return 0;
    }
    let bps = bps::DENOMINATOR as i128;
    let delta = to as i128 - from as i128;
    let change = delta.saturating_mul(bps) / from as i128;
    change.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Annualize a return observed over `elapsed_secs`
///
/// Simple (non-compounded) scaling: `return_bps * YEAR / elapsed`.
pub fn annualize_bps(return_bps: i64, elapsed_secs: u64) -> i64 {
    if elapsed_secs == 0 {
        return 0;
    }
    let annual = return_bps as i128 * time::YEAR as i128 / elapsed_secs as i128;
    annual.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> VaultResult<u64> {
    a.checked_add(b).ok_or(VaultError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> VaultResult<u64> {
    a.checked_sub(b).ok_or(VaultError::Underflow)
}
