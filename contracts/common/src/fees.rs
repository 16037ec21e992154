//! Fee Engine
//!
//! Performance and management fee math plus the fee ledger embedded in
//! vault state.
//!
//! ## Fee Model
//!
//! - **Performance fee**: share of realized harvested yield, at most 20%
//! - **Management fee**: `total_assets * bps / 10000 / 365` per collection;
//!   the caller decides the cadence
//!
//! Rate changes take effect immediately without proration.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::bps;
use crate::constants::fees::{
    DAYS_PER_YEAR, DEFAULT_MANAGEMENT_FEE_BPS, DEFAULT_PERFORMANCE_FEE_BPS, MAX_MANAGEMENT_FEE_BPS,
    MAX_PERFORMANCE_FEE_BPS,
};
use crate::errors::{VaultError, VaultResult};
use crate::events::FeeKind;
use crate::math::{apply_bps, safe_add};
use crate::types::Address;
use crate::validation::{require_address, require_in_range};

/// Fee configuration and cumulative collections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeeLedger {
    /// Performance fee on harvested yield (basis points)
    pub performance_fee_bps: u64,
    /// Annual management fee on total assets (basis points)
    pub management_fee_bps: u64,
    /// Receiver of every fee payment
    pub recipient: Address,
    /// Cumulative performance fees paid
    pub performance_fees_collected: u64,
    /// Cumulative management fees paid
    pub management_fees_collected: u64,
    /// Timestamp of the last management fee collection (0 = never)
    pub last_management_collection: u64,
}

impl FeeLedger {
    /// Create a fee ledger with validated rates
    pub fn new(
        performance_fee_bps: u64,
        management_fee_bps: u64,
        recipient: Address,
    ) -> VaultResult<Self> {
        validate_performance_fee(performance_fee_bps)?;
        validate_management_fee(management_fee_bps)?;
        require_address(&recipient, "fee recipient cannot be zero address")?;
        Ok(Self {
            performance_fee_bps,
            management_fee_bps,
            recipient,
            performance_fees_collected: 0,
            management_fees_collected: 0,
            last_management_collection: 0,
        })
    }

    /// Create a fee ledger with default rates
    pub fn with_defaults(recipient: Address) -> VaultResult<Self> {
        Self::new(DEFAULT_PERFORMANCE_FEE_BPS, DEFAULT_MANAGEMENT_FEE_BPS, recipient)
    }

    /// Performance fee owed on `harvested` yield
    pub fn performance_fee(&self, harvested: u64) -> VaultResult<u64> {
        performance_fee(harvested, self.performance_fee_bps)
    }

    /// Management fee for one day on `total_assets`
    pub fn daily_management_fee(&self, total_assets: u64) -> VaultResult<u64> {
        daily_management_fee(total_assets, self.management_fee_bps)
    }

    /// Total fees paid since inception
    pub fn total_collected(&self) -> u64 {
        self.performance_fees_collected
            .saturating_add(self.management_fees_collected)
    }

    pub fn set_performance_fee(&mut self, fee_bps: u64) -> VaultResult<()> {
        validate_performance_fee(fee_bps)?;
        self.performance_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_management_fee(&mut self, fee_bps: u64) -> VaultResult<()> {
        validate_management_fee(fee_bps)?;
        self.management_fee_bps = fee_bps;
        Ok(())
    }

    pub fn set_recipient(&mut self, recipient: Address) -> VaultResult<()> {
        require_address(&recipient, "fee recipient cannot be zero address")?;
        self.recipient = recipient;
        Ok(())
    }

    /// Book a fee payment
    pub fn record_collection(&mut self, kind: FeeKind, amount: u64, now: u64) -> VaultResult<()> {
        match kind {
            FeeKind::Performance => {
                self.performance_fees_collected =
                    safe_add(self.performance_fees_collected, amount)?;
            }
            FeeKind::Management => {
                self.management_fees_collected = safe_add(self.management_fees_collected, amount)?;
                self.last_management_collection = now;
            }
        }
        Ok(())
    }
}

// ============ Fee Math ============

/// Validate a performance fee rate
pub fn validate_performance_fee(fee_bps: u64) -> VaultResult<()> {
    require_in_range(fee_bps, 0, MAX_PERFORMANCE_FEE_BPS, "performance_fee_bps")
}

/// Validate a management fee rate
pub fn validate_management_fee(fee_bps: u64) -> VaultResult<()> {
    require_in_range(fee_bps, 0, MAX_MANAGEMENT_FEE_BPS, "management_fee_bps")
}

/// Performance fee = harvested * fee_bps / 10000 (rounded down)
pub fn performance_fee(harvested: u64, fee_bps: u64) -> VaultResult<u64> {
    apply_bps(harvested, fee_bps)
}

/// Daily management fee = total_assets * fee_bps / 10000 / 365 (rounded down)
pub fn daily_management_fee(total_assets: u64, fee_bps: u64) -> VaultResult<u64> {
    let annual = (total_assets as u128)
        .checked_mul(fee_bps as u128)
        .ok_or(VaultError::Overflow)?;
    let daily = annual / bps::DENOMINATOR as u128 / DAYS_PER_YEAR as u128;
    u64::try_from(daily).map_err(|_| VaultError::Overflow)
}
