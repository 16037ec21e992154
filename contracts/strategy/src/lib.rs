//! YieldVault Strategy Adapters
//!
//! The [`StrategyAdapter`] trait every yield source implements, plus
//! [`LendingStrategy`], a simulated money-market adapter used by tests
//! and the simulation binary.

pub mod adapter;
pub mod lending;

pub use adapter::{
    strategy_id_from_name, StrategyAdapter, StrategyError, StrategyInfo, StrategyResult,
};
pub use lending::{LendingMarketConfig, LendingStrategy};
