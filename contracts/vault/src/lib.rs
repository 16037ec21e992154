//! YieldVault
//!
//! Multi-strategy yield vault. Pooled deposits are tokenized as shares,
//! spread across pluggable strategies by target weight, harvested for
//! yield, and halted by a circuit breaker when losses exceed a threshold.
//!
//! ## Modules
//!
//! - **vault**: share ledger, deposits and withdrawals, pause and breaker
//!   controls
//! - **allocation**: strategy registry, rebalance, harvest, emergency exit
//! - **fees**: management fee collection and fee parameters
//! - **metrics**: vault info and share-price performance
//! - **snapshot**: checksummed persistence
//! - **config**: creation parameters from TOML or environment

pub mod allocation;
pub mod config;
pub mod fees;
pub mod metrics;
pub mod snapshot;
pub mod vault;

#[cfg(test)]
mod integration_tests;

pub use allocation::{
    EmergencyWithdrawReport, HarvestAction, HarvestReport, KeeperStatus, RebalanceAction,
    RebalanceReport, StrategyOutcome,
};
pub use config::VaultConfig;
pub use metrics::{PerformanceMetrics, PerformanceTracker, StrategySummary, VaultInfo};
pub use snapshot::VaultSnapshot;
pub use vault::Vault;
