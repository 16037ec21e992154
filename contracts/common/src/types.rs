//! Core Types for the YieldVault core
//!
//! Identity, status and accounting records shared by the vault, the
//! strategy adapters and persistence.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::bps;
use crate::errors::{AmountErrorReason, VaultError, VaultResult};

/// Type alias for holder / actor addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for strategy identifiers
pub type StrategyId = [u8; 32];

/// Type alias for the underlying asset identifier
pub type AssetId = [u8; 32];

/// The zero address, never a valid holder or recipient
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Deterministic 32-byte identifier: sha256(domain || ":" || label)
pub fn derive_id(domain: &str, label: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    hasher.update(label.as_bytes());
    hasher.finalize().into()
}

/// Address derived from a human-readable label
pub fn address_from_label(label: &str) -> Address {
    derive_id("yieldvault:address", label)
}

// ============ Vault Types ============

/// Risk appetite declared by the vault
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

/// Lifecycle status of a vault
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub enum VaultStatus {
    /// Accepting deposits and running strategies
    #[default]
    Active,
    /// Paused by an admin
    Paused,
    /// Paused by a guardian; only an admin may lift it
    EmergencyPaused,
    /// Strategies exited after an emergency withdraw; terminal
    Deprecated,
}

impl VaultStatus {
    /// Deposits, mints, rebalances and harvests require `Active`
    pub fn accepts_deposits(&self) -> bool {
        *self == VaultStatus::Active
    }

    /// Holders keep their exit in a deprecated vault
    pub fn allows_exit(&self) -> bool {
        matches!(self, VaultStatus::Active | VaultStatus::Deprecated)
    }
}

/// Static identity of a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultIdentity {
    /// Share token name
    pub name: String,
    /// Share token symbol
    pub symbol: String,
    /// Underlying asset accepted by the vault
    pub asset: AssetId,
    /// Declared risk profile
    pub risk_profile: RiskProfile,
    /// Administrator that created the vault
    pub admin: Address,
}

// ============ Allocation Types ============

/// One strategy's place in the allocation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StrategyAllocation {
    /// Strategy identifier
    pub strategy: StrategyId,
    /// Target share of total vault assets (0 - 10000)
    pub target_bps: u64,
    /// Last known value held by the strategy
    pub current_assets: u64,
    /// Whether the allocation participates in accounting and rebalancing
    pub active: bool,
    /// Timestamp the strategy was added
    pub added_at: u64,
}

impl StrategyAllocation {
    /// Creates a new active allocation record
    pub fn new(strategy: StrategyId, target_bps: u64, added_at: u64) -> Self {
        Self {
            strategy,
            target_bps,
            current_assets: 0,
            active: true,
            added_at,
        }
    }

    /// Retire the record, keeping it for audit history
    pub fn deactivate(&mut self) {
        self.active = false;
        self.target_bps = 0;
    }
}

/// Sum of active targets, optionally excluding one strategy
pub fn active_allocation_bps(
    allocations: &[StrategyAllocation],
    exclude: Option<&StrategyId>,
) -> u64 {
    allocations
        .iter()
        .filter(|a| a.active && Some(&a.strategy) != exclude)
        .map(|a| a.target_bps)
        .sum()
}

/// Validate that `target_bps` fits next to the other active allocations
pub fn check_allocation_cap(
    allocations: &[StrategyAllocation],
    target_bps: u64,
    exclude: Option<&StrategyId>,
) -> VaultResult<()> {
    if target_bps > bps::MAX_TOTAL_ALLOCATION {
        return Err(VaultError::InvalidAllocation { bps: target_bps });
    }
    let used = active_allocation_bps(allocations, exclude);
    let available = bps::MAX_TOTAL_ALLOCATION.saturating_sub(used);
    if target_bps > available {
        return Err(VaultError::AllocationExceeded {
            requested_bps: target_bps,
            available_bps: available,
        });
    }
    Ok(())
}

// ============ Share Ledger ============

/// Share balances and allowances of a vault
#[derive(
    Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct ShareLedger {
    /// Total shares outstanding
    pub total_shares: u64,
    /// Holder balances; zero balances are pruned
    balances: BTreeMap<Address, u64>,
    /// owner -> spender -> shares
    allowances: BTreeMap<Address, BTreeMap<Address, u64>>,
}

impl ShareLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares held by `holder`
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    /// Number of holders with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Iterate holder balances in address order
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.balances.iter()
    }

    /// Mint shares to `to`
    pub fn mint(&mut self, to: Address, shares: u64) -> VaultResult<()> {
        if to == ZERO_ADDRESS {
            return Err(VaultError::InvalidAddress { reason: "cannot mint to zero address" });
        }
        if shares == 0 {
            return Err(VaultError::InvalidAmount { amount: 0, reason: AmountErrorReason::Zero });
        }
        let total = self.total_shares.checked_add(shares).ok_or(VaultError::Overflow)?;
        let entry = self.balances.entry(to).or_insert(0);
        *entry = entry.checked_add(shares).ok_or(VaultError::Overflow)?;
        self.total_shares = total;
        Ok(())
    }

    /// Burn shares from `from`
    pub fn burn(&mut self, from: &Address, shares: u64) -> VaultResult<()> {
        let available = self.balance_of(from);
        if available < shares {
            return Err(VaultError::InsufficientBalance { available, requested: shares });
        }
        let remaining = available - shares;
        if remaining == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, remaining);
        }
        self.total_shares = self.total_shares.checked_sub(shares).ok_or(VaultError::Underflow)?;
        Ok(())
    }

    /// Shares `spender` may move on behalf of `owner`
    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Set the allowance of `spender` over `owner`'s shares
    pub fn approve(&mut self, owner: Address, spender: Address, shares: u64) -> VaultResult<()> {
        if spender == ZERO_ADDRESS {
            return Err(VaultError::InvalidAddress { reason: "cannot approve zero address" });
        }
        let spenders = self.allowances.entry(owner).or_default();
        if shares == 0 {
            spenders.remove(&spender);
        } else {
            spenders.insert(spender, shares);
        }
        if spenders.is_empty() {
            self.allowances.remove(&owner);
        }
        Ok(())
    }

    /// Consume allowance for a delegated burn
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        shares: u64,
    ) -> VaultResult<()> {
        let available = self.allowance(owner, spender);
        if available < shares {
            return Err(VaultError::InsufficientAllowance { available, requested: shares });
        }
        if available == u64::MAX {
            return Ok(());
        }
        self.approve(*owner, *spender, available - shares)
    }

    /// Verify that balances sum to `total_shares`
    pub fn check_consistency(&self) -> VaultResult<()> {
        let mut sum: u64 = 0;
        for shares in self.balances.values() {
            sum = sum.checked_add(*shares).ok_or(VaultError::Overflow)?;
        }
        if sum != self.total_shares {
            return Err(VaultError::ConservationViolated {
                expected: self.total_shares,
                actual: sum,
            });
        }
        Ok(())
    }
}
