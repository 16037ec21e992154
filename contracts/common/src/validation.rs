//! Validation Helpers for the YieldVault core
//!
//! Reusable guards shared by the ledger, the allocation manager and the
//! fee engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use yieldvault_common::validation::{check, require_positive};
//!
//! check!(assets <= cap, VaultError::Overflow);
//! require_positive(assets)?;
//! ```

use crate::errors::{AmountErrorReason, VaultError, VaultResult};
use crate::types::{Address, ZERO_ADDRESS};

// ============ Validation Macro ============

/// Check a condition and return an error if it fails.
///
/// ```rust,ignore
/// check!(denominator != 0, VaultError::DivisionByZero);
/// ```
#[macro_export]
macro_rules! check {
    ($condition:expr, $error:expr) => {
        if !($condition) {
            return Err($error);
        }
    };
}

pub use check;

// ============ Amount Guards ============

/// Require a non-zero amount
pub fn require_positive(amount: u64) -> VaultResult<()> {
    check!(amount > 0, VaultError::InvalidAmount { amount, reason: AmountErrorReason::Zero });
    Ok(())
}

/// Require a conversion result to be non-zero
pub fn require_non_dust(input: u64, converted: u64) -> VaultResult<()> {
    check!(
        converted > 0,
        VaultError::InvalidAmount { amount: input, reason: AmountErrorReason::RoundsToZero }
    );
    Ok(())
}

/// Require a value to be within a range (inclusive)
pub fn require_in_range(value: u64, min: u64, max: u64, param: &'static str) -> VaultResult<()> {
    check!(
        (min..=max).contains(&value),
        VaultError::InvalidParameter { param, value, min, max }
    );
    Ok(())
}

/// Require an address other than the zero address
pub fn require_address(address: &Address, reason: &'static str) -> VaultResult<()> {
    check!(*address != ZERO_ADDRESS, VaultError::InvalidAddress { reason });
    Ok(())
}
