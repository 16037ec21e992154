//! Access Control Module
//!
//! Role-based authorization for vault operations.
//!
//! Roles are resolved by an external auth collaborator and handed to every
//! operation inside an [`AuthContext`]; the vault keeps no ambient role table.
//! A role satisfies a permission when its priority is at least the priority
//! of the permission's minimum role.

use crate::errors::{VaultError, VaultResult};
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Vault roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    /// Vault administrator - parameters, emergency powers
    Admin,
    /// Guardian - circuit breaker and emergency pause
    Guardian,
    /// Strategist - strategy registry and allocations
    Strategist,
    /// Keeper - rebalance, harvest, fee collection
    Keeper,
}

impl Role {
    /// Get role priority (higher = more powerful)
    pub fn priority(&self) -> u8 {
        match self {
            Role::Admin => 100,
            Role::Guardian => 60,
            Role::Strategist => 50,
            Role::Keeper => 40,
        }
    }
}

/// Permission types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Add, remove or re-weight strategies
    ManageStrategies,
    /// Run a rebalance cycle
    Rebalance,
    /// Run a harvest cycle
    Harvest,
    /// Collect the management fee
    CollectFees,
    /// Trip the circuit breaker manually
    TriggerBreaker,
    /// Reset the breaker after cooldown
    ResetBreaker,
    /// Reset the breaker ignoring cooldown
    EmergencyReset,
    /// Guardian pause
    EmergencyPause,
    /// Pause / unpause, lift an emergency pause
    Pause,
    /// Update fees, fee recipient and breaker parameters
    UpdateParams,
    /// Exit every strategy and deprecate the vault
    EmergencyWithdraw,
}

impl Permission {
    /// Get minimum role required for this permission
    pub fn min_role(&self) -> Role {
        match self {
            Permission::Rebalance | Permission::Harvest | Permission::CollectFees => Role::Keeper,
            Permission::ManageStrategies => Role::Strategist,
            Permission::TriggerBreaker | Permission::ResetBreaker | Permission::EmergencyPause => {
                Role::Guardian
            }
            Permission::EmergencyReset
            | Permission::Pause
            | Permission::UpdateParams
            | Permission::EmergencyWithdraw => Role::Admin,
        }
    }

    /// Stable name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ManageStrategies => "manage_strategies",
            Permission::Rebalance => "rebalance",
            Permission::Harvest => "harvest",
            Permission::CollectFees => "collect_fees",
            Permission::TriggerBreaker => "trigger_breaker",
            Permission::ResetBreaker => "reset_breaker",
            Permission::EmergencyReset => "emergency_reset",
            Permission::EmergencyPause => "emergency_pause",
            Permission::Pause => "pause",
            Permission::UpdateParams => "update_params",
            Permission::EmergencyWithdraw => "emergency_withdraw",
        }
    }
}

/// Caller identity plus the roles resolved for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Address performing the call
    pub caller: Address,
    /// Roles held by the caller
    pub roles: Vec<Role>,
}

impl AuthContext {
    /// Context for an end user with no privileged role
    pub fn user(caller: Address) -> Self {
        Self { caller, roles: Vec::new() }
    }

    /// Context with a set of roles
    pub fn with_roles(caller: Address, roles: &[Role]) -> Self {
        Self { caller, roles: roles.to_vec() }
    }

    /// Check if the caller holds exactly `role`
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Check if the caller may exercise `permission`
    pub fn has_permission(&self, permission: Permission) -> bool {
        let min_priority = permission.min_role().priority();
        self.roles.iter().any(|r| r.priority() >= min_priority)
    }

    /// Fail with `Unauthorized` unless the caller may exercise `permission`
    pub fn require(&self, permission: Permission) -> VaultResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(VaultError::Unauthorized {
                caller: self.caller,
                permission: permission.name(),
            })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
