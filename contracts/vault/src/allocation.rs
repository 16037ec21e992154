//! Allocation Manager
//!
//! Registers strategies, keeps target weights under 100% and moves idle
//! assets toward those targets.
//!
//! ## Batch semantics
//!
//! `rebalance`, `harvest_yield` and `emergency_withdraw` visit active
//! strategies one at a time in insertion order. A failing or timed-out
//! strategy is recorded in the report and the walk continues.
//! Insertion order is not an optimal execution order: an over-allocated
//! strategy late in the list frees idle assets only after earlier
//! strategies were funded.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use yieldvault_common::access_control::{AuthContext, Permission};
use yieldvault_common::constants::allocation::{MAX_STRATEGIES, REBALANCE_COOLDOWN_SECS};
use yieldvault_common::constants::bps;
use yieldvault_common::errors::{VaultError, VaultResult};
use yieldvault_common::events::{FeeKind, VaultEvent};
use yieldvault_common::math::{mul_div, safe_add, safe_sub, Rounding};
use yieldvault_common::types::{check_allocation_cap, StrategyAllocation, StrategyId, VaultStatus};
use yieldvault_strategy::{StrategyAdapter, StrategyInfo};

use crate::vault::{record_strategy_failure, Vault};

// ============================================================================
// Reports
// ============================================================================

/// What a rebalance did to one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RebalanceAction {
    /// Idle assets sent to the strategy
    Deposited(u64),
    /// Excess pulled back to idle
    Withdrew { requested: u64, received: u64 },
    /// Already on target, or no idle assets left to fund it
    Unchanged,
}

/// Per-strategy outcome of a batch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutcome<T> {
    pub strategy: StrategyId,
    pub result: VaultResult<T>,
}

/// Result of one rebalance cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceReport {
    /// Total assets the targets were computed from
    pub total_assets: u64,
    pub outcomes: Vec<StrategyOutcome<RebalanceAction>>,
    pub succeeded: u32,
    pub failed: u32,
    pub timestamp: u64,
}

/// What a harvest did to one strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarvestAction {
    Harvested(u64),
    /// Reported nothing to harvest
    Skipped,
}

/// Result of one harvest cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub harvested: u64,
    pub performance_fee: u64,
    pub outcomes: Vec<StrategyOutcome<HarvestAction>>,
    pub succeeded: u32,
    pub failed: u32,
    pub timestamp: u64,
}

/// Result of an emergency withdraw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyWithdrawReport {
    pub recovered: u64,
    pub outcomes: Vec<StrategyOutcome<u64>>,
    /// Last known value left behind in strategies that failed to exit fully
    pub stranded: u64,
}

/// Read-only upkeep check for keepers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeeperStatus {
    pub status: VaultStatus,
    pub breaker_tripped: bool,
    pub rebalance_due: bool,
    pub rebalance_ready_at: u64,
    pub harvestable: Vec<StrategyId>,
    /// Management fee a `collect_fees` call would charge now
    pub management_fee_due: u64,
}

fn tally<T>(outcomes: &[StrategyOutcome<T>]) -> (u32, u32) {
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count() as u32;
    (outcomes.len() as u32 - failed, failed)
}

// ============================================================================
// Operations
// ============================================================================

impl Vault {
    /// Register a strategy with a target weight
    pub async fn add_strategy(
        &self,
        auth: &AuthContext,
        adapter: Arc<dyn StrategyAdapter>,
        target_bps: u64,
    ) -> VaultResult<StrategyId> {
        auth.require(Permission::ManageStrategies)?;
        if target_bps > bps::MAX_TOTAL_ALLOCATION {
            return Err(VaultError::InvalidAllocation { bps: target_bps });
        }
        let now = self.now();
        let strategy = adapter.id();
        let mut state = self.state.write().await;
        if state.status == VaultStatus::Deprecated {
            return Err(VaultError::VaultNotActive { status: state.status });
        }
        if state.allocations.iter().any(|a| a.strategy == strategy) {
            return Err(VaultError::StrategyAlreadyExists { strategy });
        }
        if state.allocations.len() >= MAX_STRATEGIES {
            return Err(VaultError::TooManyStrategies { maximum: MAX_STRATEGIES });
        }
        check_allocation_cap(&state.allocations, target_bps, None)?;

        self.call_adapter(strategy, "authorize_vault", adapter.authorize_vault(self.address()))
            .await?;

        let name = adapter.info().name;
        state.allocations.push(StrategyAllocation::new(strategy, target_bps, now));
        state.adapters.insert(strategy, adapter);
        state.events.emit(VaultEvent::StrategyAdded { strategy, target_bps, timestamp: now });
        info!(strategy = %name, target_bps, "strategy added");
        Ok(strategy)
    }

    /// Retire a strategy, recovering what it will give back
    ///
    /// A failing `withdraw_all` does not block removal; the record keeps its
    /// last known value for audit. Removal also runs while the breaker is
    /// tripped, and a loss found on the way in trips it without stopping
    /// the removal.
    pub async fn remove_strategy(
        &self,
        auth: &AuthContext,
        strategy: &StrategyId,
    ) -> VaultResult<u64> {
        auth.require(Permission::ManageStrategies)?;
        let now = self.now();
        let mut state = self.state.write().await;
        let index = state.allocation_index(strategy)?;
        let (before, tripped) =
            self.check_prior_loss(&mut state, auth.caller, "remove_strategy", now).await?;
        if tripped {
            warn!(strategy = %hex::encode(&strategy[..4]), "loss found before removal, continuing");
        }
        let adapter = state.adapter(strategy)?;
        let held = state.allocations[index].current_assets;

        let exit = self.call_adapter(*strategy, "withdraw_all", adapter.withdraw_all()).await;
        let recovered = match exit {
            Ok(received) => {
                state.idle = safe_add(state.idle, received)?;
                self.refresh_allocation(&mut state, index, held.saturating_sub(received)).await;
                received
            }
            Err(e) => {
                warn!(
                    strategy = %hex::encode(&strategy[..4]),
                    error = %e,
                    "removing strategy without recovering funds"
                );
                record_strategy_failure(&mut state, *strategy, "withdraw_all", &e, now);
                0
            }
        };

        state.allocations[index].deactivate();
        state.events.emit(VaultEvent::StrategyRemoved {
            strategy: *strategy,
            recovered,
            timestamp: now,
        });
        self.finish_mutation(&mut state, auth.caller, "remove_strategy", before, now)?;
        info!(
            strategy = %hex::encode(&strategy[..4]),
            recovered,
            left_behind = state.allocations[index].current_assets,
            "strategy removed"
        );
        Ok(recovered)
    }

    /// Change a strategy's target weight
    pub async fn update_allocation(
        &self,
        auth: &AuthContext,
        strategy: &StrategyId,
        new_bps: u64,
    ) -> VaultResult<()> {
        auth.require(Permission::ManageStrategies)?;
        let now = self.now();
        let mut state = self.state.write().await;
        let index = state.allocation_index(strategy)?;
        check_allocation_cap(&state.allocations, new_bps, Some(strategy))?;

        let old_bps = state.allocations[index].target_bps;
        state.allocations[index].target_bps = new_bps;
        state.events.emit(VaultEvent::AllocationUpdated {
            strategy: *strategy,
            old_bps,
            new_bps,
            timestamp: now,
        });
        info!(strategy = %hex::encode(&strategy[..4]), old_bps, new_bps, "allocation updated");
        Ok(())
    }

    /// Move assets toward target weights
    pub async fn rebalance(&self, auth: &AuthContext) -> VaultResult<RebalanceReport> {
        auth.require(Permission::Rebalance)?;
        let now = self.now();
        let mut state = self.state.write().await;
        state.ensure_active()?;
        state.ensure_breaker_normal()?;
        let ready_at = state.last_rebalance.saturating_add(REBALANCE_COOLDOWN_SECS);
        if state.last_rebalance != 0 && now < ready_at {
            return Err(VaultError::RebalanceCooldownActive { ready_at, now });
        }

        let total = self.begin_mutation(&mut state, auth.caller, "rebalance", now).await?;
        let mut outcomes = Vec::new();

        for index in 0..state.allocations.len() {
            let allocation = &state.allocations[index];
            if !allocation.active {
                continue;
            }
            let strategy = allocation.strategy;
            let current = allocation.current_assets;
            let target = mul_div(total, allocation.target_bps, bps::DENOMINATOR, Rounding::Down)?;
            let adapter = state.adapter(&strategy)?;

            let result = if current < target {
                let amount = (target - current).min(state.idle);
                if amount == 0 {
                    Ok(RebalanceAction::Unchanged)
                } else {
                    match self.call_adapter(strategy, "deposit", adapter.deposit(amount)).await {
                        Ok(()) => {
                            state.idle = safe_sub(state.idle, amount)?;
                            let expected = current.saturating_add(amount);
                            self.refresh_allocation(&mut state, index, expected).await;
                            Ok(RebalanceAction::Deposited(amount))
                        }
                        Err(e) => Err(e),
                    }
                }
            } else if current > target {
                let excess = current - target;
                match self.call_adapter(strategy, "withdraw", adapter.withdraw(excess)).await {
                    Ok(received) => {
                        state.idle = safe_add(state.idle, received)?;
                        let expected = current.saturating_sub(received);
                        self.refresh_allocation(&mut state, index, expected).await;
                        Ok(RebalanceAction::Withdrew { requested: excess, received })
                    }
                    Err(e) => Err(e),
                }
            } else {
                Ok(RebalanceAction::Unchanged)
            };

            if let Err(e) = &result {
                let operation = if current < target { "deposit" } else { "withdraw" };
                record_strategy_failure(&mut state, strategy, operation, e, now);
            }
            outcomes.push(StrategyOutcome { strategy, result });
        }

        state.last_rebalance = now;
        let (succeeded, failed) = tally(&outcomes);
        let total_after = self.finish_mutation(&mut state, auth.caller, "rebalance", total, now)?;
        state.events.emit(VaultEvent::Rebalanced {
            total_assets: total_after,
            succeeded,
            failed,
            timestamp: now,
        });
        info!(
            total_assets = total_after,
            succeeded,
            failed,
            idle = state.idle,
            "rebalance complete"
        );

        Ok(RebalanceReport { total_assets: total, outcomes, succeeded, failed, timestamp: now })
    }

    /// Realize yield from every harvestable strategy and take the
    /// performance fee
    ///
    /// `CannotHarvest` means every strategy answered and none was ready.
    /// When some strategy failed to answer, the report is returned instead
    /// so the failures can be retried.
    pub async fn harvest_yield(&self, auth: &AuthContext) -> VaultResult<HarvestReport> {
        auth.require(Permission::Harvest)?;
        let now = self.now();
        let mut state = self.state.write().await;
        state.ensure_active()?;

        let before = self.begin_mutation(&mut state, auth.caller, "harvest", now).await?;
        let mut outcomes = Vec::new();
        let mut harvestable = 0u32;
        let mut harvested: u64 = 0;

        for index in 0..state.allocations.len() {
            let allocation = &state.allocations[index];
            if !allocation.active {
                continue;
            }
            let strategy = allocation.strategy;
            let held = allocation.current_assets;
            let adapter = state.adapter(&strategy)?;

            let check = self.call_adapter(strategy, "can_harvest", adapter.can_harvest()).await;
            let ready = match check {
                Ok(ready) => ready,
                Err(e) => {
                    record_strategy_failure(&mut state, strategy, "can_harvest", &e, now);
                    outcomes.push(StrategyOutcome { strategy, result: Err(e) });
                    continue;
                }
            };
            if !ready {
                outcomes.push(StrategyOutcome { strategy, result: Ok(HarvestAction::Skipped) });
                continue;
            }
            harvestable += 1;

            let result = match self.call_adapter(strategy, "harvest", adapter.harvest()).await {
                Ok(amount) => {
                    harvested = safe_add(harvested, amount)?;
                    state.idle = safe_add(state.idle, amount)?;
                    self.refresh_allocation(&mut state, index, held).await;
                    Ok(HarvestAction::Harvested(amount))
                }
                Err(e) => {
                    record_strategy_failure(&mut state, strategy, "harvest", &e, now);
                    Err(e)
                }
            };
            outcomes.push(StrategyOutcome { strategy, result });
        }

        let (succeeded, failed) = tally(&outcomes);
        if harvestable == 0 && failed == 0 {
            return Err(VaultError::CannotHarvest);
        }

        let mut performance_fee = 0;
        if harvested > 0 {
            state.total_yield_generated = safe_add(state.total_yield_generated, harvested)?;
            performance_fee = state.fees.performance_fee(harvested)?;
            if performance_fee > 0 {
                state.idle = safe_sub(state.idle, performance_fee)?;
                state.fees.record_collection(FeeKind::Performance, performance_fee, now)?;
                let recipient = state.fees.recipient;
                state.events.emit(VaultEvent::FeesCollected {
                    kind: FeeKind::Performance,
                    amount: performance_fee,
                    recipient,
                    timestamp: now,
                });
            }
            state.events.emit(VaultEvent::YieldHarvested {
                harvested,
                performance_fee,
                succeeded,
                failed,
                timestamp: now,
            });
        }

        let expected = before.saturating_sub(performance_fee);
        self.finish_mutation(&mut state, auth.caller, "harvest", expected, now)?;
        info!(harvested, performance_fee, succeeded, failed, "harvest complete");

        Ok(HarvestReport {
            harvested,
            performance_fee,
            outcomes,
            succeeded,
            failed,
            timestamp: now,
        })
    }

    /// Exit every strategy and deprecate the vault
    ///
    /// Losses realized here are reported, not fed to the breaker, so that
    /// holders can still exit the deprecated vault.
    pub async fn emergency_withdraw(
        &self,
        auth: &AuthContext,
    ) -> VaultResult<EmergencyWithdrawReport> {
        auth.require(Permission::EmergencyWithdraw)?;
        let now = self.now();
        let mut state = self.state.write().await;
        if state.status == VaultStatus::Deprecated {
            return Err(VaultError::VaultNotActive { status: state.status });
        }
        self.refresh_total(&mut state).await?;

        let mut outcomes = Vec::new();
        let mut recovered: u64 = 0;
        let mut stranded: u64 = 0;
        for index in 0..state.allocations.len() {
            let allocation = &state.allocations[index];
            if !allocation.active {
                continue;
            }
            let strategy = allocation.strategy;
            let held = allocation.current_assets;
            let adapter = state.adapter(&strategy)?;

            let exit = self
                .call_adapter(strategy, "emergency_exit", adapter.emergency_exit())
                .await;
            let result = match exit {
                Ok(amount) => {
                    recovered = safe_add(recovered, amount)?;
                    state.idle = safe_add(state.idle, amount)?;
                    self.refresh_allocation(&mut state, index, held.saturating_sub(amount)).await;
                    Ok(amount)
                }
                Err(e) => {
                    record_strategy_failure(&mut state, strategy, "emergency_exit", &e, now);
                    Err(e)
                }
            };
            stranded = stranded.saturating_add(state.allocations[index].current_assets);
            state.allocations[index].deactivate();
            outcomes.push(StrategyOutcome { strategy, result });
        }

        let old_status = state.status;
        state.status = VaultStatus::Deprecated;
        let (_, failed) = tally(&outcomes);
        state.events.emit(VaultEvent::EmergencyWithdraw {
            actor: auth.caller,
            recovered,
            failed,
            timestamp: now,
        });
        state.events.emit(VaultEvent::StatusChanged {
            actor: auth.caller,
            old_status,
            new_status: VaultStatus::Deprecated,
            timestamp: now,
        });
        let total = state.book_total()?;
        self.settle(&mut state, total, now);
        warn!(recovered, stranded, failed, "emergency withdraw complete, vault deprecated");

        Ok(EmergencyWithdrawReport { recovered, outcomes, stranded })
    }

    /// What a keeper should do next
    pub async fn keeper_status(&self) -> VaultResult<KeeperStatus> {
        let total = self.total_assets().await?;
        let now = self.now();
        let state = self.state.read().await;
        let rebalance_ready_at = if state.last_rebalance == 0 {
            0
        } else {
            state.last_rebalance.saturating_add(REBALANCE_COOLDOWN_SECS)
        };
        let operational = state.status.accepts_deposits() && !state.breaker.active;

        let mut harvestable = Vec::new();
        if operational {
            for allocation in state.allocations.iter().filter(|a| a.active) {
                let Ok(adapter) = state.adapter(&allocation.strategy) else {
                    continue;
                };
                if let Ok(true) = self
                    .call_adapter(allocation.strategy, "can_harvest", adapter.can_harvest())
                    .await
                {
                    harvestable.push(allocation.strategy);
                }
            }
        }

        Ok(KeeperStatus {
            status: state.status,
            breaker_tripped: state.breaker.active,
            rebalance_due: operational
                && !state.allocations.is_empty()
                && now >= rebalance_ready_at,
            rebalance_ready_at,
            harvestable,
            management_fee_due: state.fees.daily_management_fee(total)?,
        })
    }

    /// Allocation records in insertion order, retired ones included
    pub async fn strategy_allocations(&self) -> Vec<StrategyAllocation> {
        self.state.read().await.allocations.clone()
    }

    /// Metadata reported by a registered strategy
    pub async fn strategy_info(&self, strategy: &StrategyId) -> VaultResult<StrategyInfo> {
        Ok(self.state.read().await.adapter(strategy)?.info())
    }
}
