//! Strategy Adapter Interface
//!
//! A strategy is an external yield source the vault lends idle assets to.
//! The vault only ever holds `Arc<dyn StrategyAdapter>` handles; how a
//! strategy values positions, sells rewards or talks to its protocol stays
//! behind this trait.

use core::fmt;

use serde::{Deserialize, Serialize};
use yieldvault_common::types::{derive_id, Address, StrategyId};

/// Result type alias for adapter calls
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Errors reported by strategy adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Adapter is bound to a different vault
    Unauthorized { vault: Address },
    /// Zero or otherwise unusable amount
    InvalidAmount { amount: u64 },
    /// Underlying market is paused
    MarketPaused,
    /// Underlying market cannot pay out the requested amount
    InsufficientLiquidity { available: u64, requested: u64 },
    /// Arithmetic overflow inside the adapter
    Overflow,
    /// Protocol unreachable or returned garbage
    Unavailable { reason: String },
}

impl StrategyError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "S001_UNAUTHORIZED",
            Self::InvalidAmount { .. } => "S002_INVALID_AMOUNT",
            Self::MarketPaused => "S003_MARKET_PAUSED",
            Self::InsufficientLiquidity { .. } => "S004_INSUFFICIENT_LIQUIDITY",
            Self::Overflow => "S005_OVERFLOW",
            Self::Unavailable { .. } => "S006_UNAVAILABLE",
        }
    }
}

impl fmt::Display for StrategyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { vault } => {
                write!(f, "adapter bound to another vault ({})", hex_prefix(vault))
            }
            Self::InvalidAmount { amount } => write!(f, "invalid amount {amount}"),
            Self::MarketPaused => write!(f, "market paused"),
            Self::InsufficientLiquidity { available, requested } => {
                write!(f, "market liquidity {available} below requested {requested}")
            }
            Self::Overflow => write!(f, "arithmetic overflow"),
            Self::Unavailable { reason } => write!(f, "protocol unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StrategyError {}

fn hex_prefix(id: &[u8; 32]) -> String {
    hex::encode(&id[..4])
}

/// Descriptive metadata reported by a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyInfo {
    /// Display name
    pub name: String,
    /// Protocol the strategy deploys into
    pub protocol: String,
    /// Risk score, 1 (lowest) to 10
    pub risk_score: u8,
    /// Currently reported APY (basis points)
    pub apy_bps: u64,
}

/// Capability handle to one yield strategy.
///
/// Amounts are in the vault's underlying asset. `withdraw`, `withdraw_all`
/// and `emergency_exit` return what was actually released, which may be
/// less than requested when the protocol is short of liquidity. `harvest`
/// realizes accrued yield and hands it to the vault.
#[async_trait::async_trait]
pub trait StrategyAdapter: Send + Sync {
    /// Stable identifier
    fn id(&self) -> StrategyId;

    /// Descriptive metadata
    fn info(&self) -> StrategyInfo;

    /// Bind `vault` as the only caller allowed to move funds
    async fn authorize_vault(&self, _vault: Address) -> StrategyResult<()> {
        Ok(())
    }

    /// Current value of the position, excluding unharvested rewards
    async fn estimated_total_assets(&self) -> StrategyResult<u64>;

    /// Whether a harvest would realize anything
    async fn can_harvest(&self) -> StrategyResult<bool>;

    /// Deploy `amount` into the protocol
    async fn deposit(&self, amount: u64) -> StrategyResult<()>;

    /// Release up to `amount`; returns the amount released
    async fn withdraw(&self, amount: u64) -> StrategyResult<u64>;

    /// Release the whole position; returns the amount released
    async fn withdraw_all(&self) -> StrategyResult<u64>;

    /// Realize yield; returns the amount paid to the vault
    async fn harvest(&self) -> StrategyResult<u64>;

    /// Unwind everything ignoring pauses; returns the amount recovered
    async fn emergency_exit(&self) -> StrategyResult<u64>;
}

/// Deterministic strategy id from a display name
pub fn strategy_id_from_name(name: &str) -> StrategyId {
    derive_id("yieldvault:strategy", name)
}
