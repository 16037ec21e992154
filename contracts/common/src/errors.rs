//! Error Types for the YieldVault core
//!
//! Typed errors carrying enough context for an API layer to map them to
//! structured responses, with stable codes for logging.

use core::fmt;

use crate::types::{Address, StrategyId, VaultStatus};

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Main error enum for all vault operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    // ============ Amount Errors ============
    /// Zero or out-of-range amount
    InvalidAmount { amount: u64, reason: AmountErrorReason },

    /// Owner does not hold enough shares
    InsufficientBalance { available: u64, requested: u64 },

    /// Delegated caller lacks allowance for the shares required
    InsufficientAllowance { available: u64, requested: u64 },

    /// Idle balance plus everything recoverable from strategies falls short
    InsufficientLiquidity { available: u64, requested: u64 },

    // ============ Status Errors ============
    /// Vault status does not permit the operation
    VaultNotActive { status: VaultStatus },

    /// Circuit breaker is tripped
    Paused,

    // ============ Allocation Errors ============
    /// Target allocations would exceed 100%
    AllocationExceeded { requested_bps: u64, available_bps: u64 },

    /// Target allocation outside [0, 10000]
    InvalidAllocation { bps: u64 },

    /// Strategy is not registered (or no longer active)
    StrategyNotFound { strategy: StrategyId },

    /// Strategy is already registered
    StrategyAlreadyExists { strategy: StrategyId },

    /// Allocation table is full
    TooManyStrategies { maximum: usize },

    // ============ Timing Errors ============
    /// Circuit breaker reset attempted before cooldown expiry
    CooldownActive { ready_at: u64, now: u64 },

    /// Rebalance attempted before the rebalance cooldown expired
    RebalanceCooldownActive { ready_at: u64, now: u64 },

    /// No active strategy reported anything to harvest
    CannotHarvest,

    // ============ Adapter Errors ============
    /// A strategy call failed or timed out
    AdapterFailure { strategy: StrategyId, reason: String },

    // ============ Circuit Breaker Errors ============
    /// Trigger attempted while already tripped
    BreakerAlreadyTripped,

    /// Reset attempted while not tripped
    BreakerNotTripped,

    /// Explicit trigger with a loss below the configured threshold
    LossBelowThreshold { loss_bps: u64, threshold_bps: u64 },

    // ============ Authorization Errors ============
    /// Caller lacks the role required for the operation
    Unauthorized { caller: Address, permission: &'static str },

    /// Zero or otherwise unusable address
    InvalidAddress { reason: &'static str },

    /// Parameter outside its allowed bounds
    InvalidParameter { param: &'static str, value: u64, min: u64, max: u64 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,

    // ============ Integrity Errors ============
    /// Accounting invariant violated; the operation was aborted
    ConservationViolated { expected: u64, actual: u64 },

    /// Shares are outstanding but every asset behind them is gone
    SharesWithoutAssets { total_shares: u64 },

    /// Snapshot bytes could not be decoded or failed verification
    InvalidSnapshot { reason: &'static str },

    /// Configuration rejected by validation
    InvalidConfig { reason: String },
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount is zero when non-zero required
    Zero,
    /// Amount converts to zero shares or assets
    RoundsToZero,
    /// Amount exceeds maximum
    TooLarge,
}

impl VaultError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::InsufficientBalance { .. } => "E011_INSUFFICIENT_BALANCE",
            Self::InsufficientAllowance { .. } => "E012_INSUFFICIENT_ALLOWANCE",
            Self::InsufficientLiquidity { .. } => "E013_INSUFFICIENT_LIQUIDITY",
            Self::VaultNotActive { .. } => "E020_VAULT_NOT_ACTIVE",
            Self::Paused => "E021_PAUSED",
            Self::AllocationExceeded { .. } => "E030_ALLOCATION_EXCEEDED",
            Self::InvalidAllocation { .. } => "E031_INVALID_ALLOCATION",
            Self::StrategyNotFound { .. } => "E032_STRATEGY_NOT_FOUND",
            Self::StrategyAlreadyExists { .. } => "E033_STRATEGY_EXISTS",
            Self::TooManyStrategies { .. } => "E034_TOO_MANY_STRATEGIES",
            Self::CooldownActive { .. } => "E040_COOLDOWN_ACTIVE",
            Self::RebalanceCooldownActive { .. } => "E041_REBALANCE_COOLDOWN",
            Self::CannotHarvest => "E042_CANNOT_HARVEST",
            Self::AdapterFailure { .. } => "E050_ADAPTER_FAILURE",
            Self::BreakerAlreadyTripped => "E060_BREAKER_TRIPPED",
            Self::BreakerNotTripped => "E061_BREAKER_NOT_TRIPPED",
            Self::LossBelowThreshold { .. } => "E062_LOSS_BELOW_THRESHOLD",
            Self::Unauthorized { .. } => "E070_UNAUTHORIZED",
            Self::InvalidAddress { .. } => "E071_INVALID_ADDRESS",
            Self::InvalidParameter { .. } => "E072_INVALID_PARAM",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::ConservationViolated { .. } => "E090_CONSERVATION",
            Self::InvalidSnapshot { .. } => "E091_INVALID_SNAPSHOT",
            Self::InvalidConfig { .. } => "E092_INVALID_CONFIG",
            Self::SharesWithoutAssets { .. } => "E093_SHARES_WITHOUT_ASSETS",
        }
    }

    /// Returns true if this error is recoverable (caller can retry or fix it)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::InsufficientAllowance { .. }
                | Self::InsufficientLiquidity { .. }
                | Self::CooldownActive { .. }
                | Self::RebalanceCooldownActive { .. }
                | Self::CannotHarvest
                | Self::AdapterFailure { .. }
        )
    }

    /// Rejections a keeper should log and move past rather than alert on
    pub fn is_expected_rejection(&self) -> bool {
        matches!(self, Self::RebalanceCooldownActive { .. } | Self::CannotHarvest)
    }

    /// Fatal integrity failures
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConservationViolated { .. } | Self::SharesWithoutAssets { .. })
    }
}

fn short(id: &[u8; 32]) -> String {
    hex::encode(&id[..4])
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount { amount, reason } => {
                write!(f, "invalid amount {amount}: {reason:?}")
            }
            Self::InsufficientBalance { available, requested } => {
                write!(f, "insufficient shares: have {available}, need {requested}")
            }
            Self::InsufficientAllowance { available, requested } => {
                write!(f, "insufficient allowance: have {available}, need {requested}")
            }
            Self::InsufficientLiquidity { available, requested } => {
                write!(f, "insufficient liquidity: recovered {available} of {requested}")
            }
            Self::VaultNotActive { status } => write!(f, "vault is not active ({status:?})"),
            Self::Paused => write!(f, "circuit breaker is tripped"),
            Self::AllocationExceeded { requested_bps, available_bps } => write!(
                f,
                "allocation of {requested_bps} bps exceeds remaining {available_bps} bps"
            ),
            Self::InvalidAllocation { bps } => write!(f, "allocation {bps} bps out of range"),
            Self::StrategyNotFound { strategy } => {
                write!(f, "strategy {} not found", short(strategy))
            }
            Self::StrategyAlreadyExists { strategy } => {
                write!(f, "strategy {} already registered", short(strategy))
            }
            Self::TooManyStrategies { maximum } => {
                write!(f, "allocation table full ({maximum} strategies)")
            }
            Self::CooldownActive { ready_at, now } => {
                write!(f, "breaker cooldown active until {ready_at} (now {now})")
            }
            Self::RebalanceCooldownActive { ready_at, now } => {
                write!(f, "rebalance cooldown active until {ready_at} (now {now})")
            }
            Self::CannotHarvest => write!(f, "no strategy is harvestable"),
            Self::AdapterFailure { strategy, reason } => {
                write!(f, "strategy {} failed: {reason}", short(strategy))
            }
            Self::BreakerAlreadyTripped => write!(f, "circuit breaker already tripped"),
            Self::BreakerNotTripped => write!(f, "circuit breaker is not tripped"),
            Self::LossBelowThreshold { loss_bps, threshold_bps } => write!(
                f,
                "loss of {loss_bps} bps is below the {threshold_bps} bps threshold"
            ),
            Self::Unauthorized { caller, permission } => {
                write!(f, "{} lacks permission {permission}", short(caller))
            }
            Self::InvalidAddress { reason } => write!(f, "invalid address: {reason}"),
            Self::InvalidParameter { param, value, min, max } => {
                write!(f, "{param}={value} outside [{min}, {max}]")
            }
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::Underflow => write!(f, "arithmetic underflow"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::ConservationViolated { expected, actual } => {
                write!(f, "accounting invariant violated: expected {expected}, got {actual}")
            }
            Self::SharesWithoutAssets { total_shares } => {
                write!(f, "{total_shares} shares outstanding with no assets behind them")
            }
            Self::InvalidSnapshot { reason } => write!(f, "invalid snapshot: {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for VaultError {}
