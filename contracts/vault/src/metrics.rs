//! Vault Metrics
//!
//! Read-only views for the API layer and the risk service.
//!
//! ## Performance
//!
//! Performance is tracked from the share price (assets per share, scaled by
//! 1e18) observed at the end of every mutating operation:
//!
//! - **total return** = price change since inception, in bps
//! - **APY** = total return scaled linearly to one year
//! - **max drawdown** = largest fall from a running price peak, in bps

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use yieldvault_common::constants::{bps, precision};
use yieldvault_common::errors::VaultResult;
use yieldvault_common::math::{annualize_bps, price_change_bps, share_price};
use yieldvault_common::types::{
    Address, AssetId, RiskProfile, StrategyAllocation, StrategyId, VaultStatus,
};
use yieldvault_strategy::StrategyInfo;

use crate::vault::Vault;

/// Share price history summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PerformanceTracker {
    pub inception_at: u64,
    pub initial_price: u128,
    pub last_price: u128,
    pub peak_price: u128,
    pub max_drawdown_bps: u64,
    pub last_updated: u64,
}

impl PerformanceTracker {
    pub fn new(now: u64) -> Self {
        Self {
            inception_at: now,
            initial_price: precision::PRICE_SCALE,
            last_price: precision::PRICE_SCALE,
            peak_price: precision::PRICE_SCALE,
            max_drawdown_bps: 0,
            last_updated: now,
        }
    }

    /// Record the price implied by `total_assets / total_shares`.
    ///
    /// An empty vault has no price and is skipped.
    pub fn record(&mut self, total_assets: u64, total_shares: u64, now: u64) {
        if total_shares == 0 {
            return;
        }
        let price = share_price(total_assets, total_shares);
        self.last_price = price;
        self.last_updated = now;
        if price > self.peak_price {
            self.peak_price = price;
        } else {
            let drop = self.peak_price - price;
            let drawdown = drop.saturating_mul(bps::DENOMINATOR as u128) / self.peak_price;
            self.max_drawdown_bps = self.max_drawdown_bps.max(drawdown as u64);
        }
    }

    pub fn total_return_bps(&self) -> i64 {
        price_change_bps(self.initial_price, self.last_price)
    }

    /// Annualized return since inception, measured at `now`
    pub fn apy_bps(&self, now: u64) -> i64 {
        annualize_bps(self.total_return_bps(), now.saturating_sub(self.inception_at))
    }
}

/// Vault summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultInfo {
    pub name: String,
    pub symbol: String,
    pub asset: AssetId,
    pub risk_profile: RiskProfile,
    pub status: VaultStatus,
    pub total_assets: u64,
    pub total_shares: u64,
    pub idle_assets: u64,
    /// Assets per share, scaled by 1e18
    pub share_price: u128,
    pub performance_fee_bps: u64,
    pub management_fee_bps: u64,
    pub fee_recipient: Address,
    pub last_rebalance: u64,
    pub total_yield_generated: u64,
    pub active_strategies: usize,
    pub breaker_tripped: bool,
}

/// Performance summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub share_price: u128,
    pub total_return_bps: i64,
    pub apy_bps: i64,
    pub max_drawdown_bps: u64,
    pub total_yield_generated: u64,
    pub performance_fees_collected: u64,
    pub management_fees_collected: u64,
    pub inception_at: u64,
    pub last_updated: u64,
}

/// One strategy's allocation together with its reported metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: StrategyId,
    pub info: Option<StrategyInfo>,
    pub allocation: StrategyAllocation,
}

impl Vault {
    /// Identity, balances and parameters in one view
    pub async fn vault_info(&self) -> VaultResult<VaultInfo> {
        let total_assets = self.total_assets().await?;
        let state = self.state.read().await;
        let identity = self.identity();
        Ok(VaultInfo {
            name: identity.name.clone(),
            symbol: identity.symbol.clone(),
            asset: identity.asset,
            risk_profile: identity.risk_profile,
            status: state.status,
            total_assets,
            total_shares: state.ledger.total_shares,
            idle_assets: state.idle,
            share_price: share_price(total_assets, state.ledger.total_shares),
            performance_fee_bps: state.fees.performance_fee_bps,
            management_fee_bps: state.fees.management_fee_bps,
            fee_recipient: state.fees.recipient,
            last_rebalance: state.last_rebalance,
            total_yield_generated: state.total_yield_generated,
            active_strategies: state.allocations.iter().filter(|a| a.active).count(),
            breaker_tripped: state.breaker.active,
        })
    }

    pub async fn performance_metrics(&self) -> PerformanceMetrics {
        let now = self.now();
        let state = self.state.read().await;
        let tracker = &state.performance;
        PerformanceMetrics {
            share_price: tracker.last_price,
            total_return_bps: tracker.total_return_bps(),
            apy_bps: tracker.apy_bps(now),
            max_drawdown_bps: tracker.max_drawdown_bps,
            total_yield_generated: state.total_yield_generated,
            performance_fees_collected: state.fees.performance_fees_collected,
            management_fees_collected: state.fees.management_fees_collected,
            inception_at: tracker.inception_at,
            last_updated: tracker.last_updated,
        }
    }

    /// Annualized share price growth since inception (bps)
    pub async fn apy_bps(&self) -> i64 {
        let now = self.now();
        self.state.read().await.performance.apy_bps(now)
    }

    /// Every allocation record, retired ones included, with strategy metadata
    pub async fn strategy_summaries(&self) -> Vec<StrategySummary> {
        let state = self.state.read().await;
        state
            .allocations
            .iter()
            .map(|allocation| StrategySummary {
                strategy: allocation.strategy,
                info: state.adapters.get(&allocation.strategy).map(|a| a.info()),
                allocation: allocation.clone(),
            })
            .collect()
    }
}
