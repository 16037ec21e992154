//! Vault Ledger
//!
//! Share accounting for a multi-strategy vault. Deposits mint shares at
//! the current exchange rate, withdrawals burn them and pull liquidity back
//! from strategies when the idle balance falls short.
//!
//! ## Concurrency
//!
//! All state sits behind one `tokio::sync::RwLock`. A mutating operation
//! holds the write lock from validation to commit, adapter awaits included,
//! so operations are serialized and never re-enter. Reads share the lock.
//!
//! ## Accounting
//!
//! `total_assets = idle + Σ estimated_total_assets(active strategies)`.
//! Every asset-changing operation:
//!
//! 1. re-measures total assets and compares them with the value left by the
//!    previous operation (a shortfall past the threshold trips the breaker
//!    and the operation fails with `Paused`, except strategy removal, which
//!    carries on)
//! 2. applies its flows
//! 3. compares the expected result with the measured one and feeds any
//!    loss to the circuit breaker

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use yieldvault_common::access_control::{AuthContext, Permission};
use yieldvault_common::circuit_breaker::{self, BreakerTrigger, CircuitBreakerState};
use yieldvault_common::clock::Clock;
use yieldvault_common::errors::{VaultError, VaultResult};
use yieldvault_common::events::{EventLog, VaultEvent};
use yieldvault_common::fees::FeeLedger;
use yieldvault_common::math::{self, safe_add, safe_sub, Rounding};
use yieldvault_common::types::{
    derive_id, Address, ShareLedger, StrategyAllocation, StrategyId, VaultIdentity, VaultStatus,
};
use yieldvault_common::validation::{require_address, require_non_dust, require_positive};
use yieldvault_strategy::{StrategyAdapter, StrategyResult};

use crate::config::VaultConfig;
use crate::metrics::PerformanceTracker;

// ============================================================================
// State
// ============================================================================

/// Everything guarded by the vault lock
pub(crate) struct VaultState {
    pub ledger: ShareLedger,
    /// Assets held by the vault itself
    pub idle: u64,
    pub status: VaultStatus,
    /// Insertion-ordered; retired records stay for audit
    pub allocations: Vec<StrategyAllocation>,
    pub adapters: BTreeMap<StrategyId, Arc<dyn StrategyAdapter>>,
    pub breaker: CircuitBreakerState,
    pub fees: FeeLedger,
    pub last_rebalance: u64,
    pub total_yield_generated: u64,
    /// Total assets measured at the end of the last mutating operation
    pub total_assets_cache: u64,
    pub performance: PerformanceTracker,
    pub events: EventLog,
    pub created_at: u64,
}

impl VaultState {
    /// Idle plus last known strategy values
    pub fn book_total(&self) -> VaultResult<u64> {
        self.allocations
            .iter()
            .filter(|a| a.active)
            .try_fold(self.idle, |acc, a| safe_add(acc, a.current_assets))
    }

    pub fn allocation_index(&self, strategy: &StrategyId) -> VaultResult<usize> {
        self.allocations
            .iter()
            .position(|a| a.active && a.strategy == *strategy)
            .ok_or(VaultError::StrategyNotFound { strategy: *strategy })
    }

    pub fn adapter(&self, strategy: &StrategyId) -> VaultResult<Arc<dyn StrategyAdapter>> {
        self.adapters
            .get(strategy)
            .cloned()
            .ok_or(VaultError::StrategyNotFound { strategy: *strategy })
    }

    pub fn ensure_breaker_normal(&self) -> VaultResult<()> {
        self.breaker.ensure_normal()
    }

    pub fn ensure_active(&self) -> VaultResult<()> {
        if !self.status.accepts_deposits() {
            return Err(VaultError::VaultNotActive { status: self.status });
        }
        Ok(())
    }
}

// ============================================================================
// Vault
// ============================================================================

/// Multi-strategy yield vault
pub struct Vault {
    address: Address,
    identity: VaultIdentity,
    adapter_timeout: Duration,
    clock: Arc<dyn Clock>,
    pub(crate) state: RwLock<VaultState>,
}

impl Vault {
    /// Create an empty vault
    pub fn new(
        config: &VaultConfig,
        admin: Address,
        fee_recipient: Address,
        clock: Arc<dyn Clock>,
    ) -> VaultResult<Self> {
        config.validate()?;
        require_address(&admin, "admin cannot be zero address")?;

        let identity = VaultIdentity {
            name: config.name.clone(),
            symbol: config.symbol.clone(),
            asset: config.asset_id(),
            risk_profile: config.risk_profile,
            admin,
        };
        let now = clock.now();
        let state = VaultState {
            ledger: ShareLedger::new(),
            idle: 0,
            status: VaultStatus::Active,
            allocations: Vec::new(),
            adapters: BTreeMap::new(),
            breaker: CircuitBreakerState::new(
                config.loss_threshold_bps,
                config.breaker_cooldown_secs,
            )?,
            fees: FeeLedger::new(
                config.performance_fee_bps,
                config.management_fee_bps,
                fee_recipient,
            )?,
            last_rebalance: 0,
            total_yield_generated: 0,
            total_assets_cache: 0,
            performance: PerformanceTracker::new(now),
            events: EventLog::new(),
            created_at: now,
        };

        info!(name = %identity.name, symbol = %identity.symbol, "vault created");
        Ok(Self::from_parts(identity, config.adapter_timeout(), clock, state))
    }

    pub(crate) fn from_parts(
        identity: VaultIdentity,
        adapter_timeout: Duration,
        clock: Arc<dyn Clock>,
        state: VaultState,
    ) -> Self {
        let address = vault_address(&identity);
        Self {
            address,
            identity,
            adapter_timeout,
            clock,
            state: RwLock::new(state),
        }
    }

    /// Address strategies see as their caller
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn identity(&self) -> &VaultIdentity {
        &self.identity
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now()
    }

    // ------------------------------------------------------------------------
    // Adapter plumbing
    // ------------------------------------------------------------------------

    /// Run one adapter call under the configured timeout
    pub(crate) async fn call_adapter<T, F>(
        &self,
        strategy: StrategyId,
        operation: &'static str,
        call: F,
    ) -> VaultResult<T>
    where
        F: Future<Output = StrategyResult<T>>,
    {
        match tokio::time::timeout(self.adapter_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(
                    strategy = %hex::encode(&strategy[..4]),
                    operation,
                    error = %e,
                    code = e.code(),
                    "adapter call failed"
                );
                Err(VaultError::AdapterFailure { strategy, reason: e.to_string() })
            }
            Err(_) => {
                let ms = self.adapter_timeout.as_millis();
                warn!(
                    strategy = %hex::encode(&strategy[..4]),
                    operation,
                    timeout_ms = ms as u64,
                    "adapter call timed out"
                );
                Err(VaultError::AdapterFailure {
                    strategy,
                    reason: format!("{operation} timed out after {ms} ms"),
                })
            }
        }
    }

    /// Fresh estimate of one strategy
    pub(crate) async fn estimate(&self, adapter: &Arc<dyn StrategyAdapter>) -> VaultResult<u64> {
        self.call_adapter(adapter.id(), "estimated_total_assets", adapter.estimated_total_assets())
            .await
    }

    /// Refresh the last known value of allocation `index`
    ///
    /// Falls back to `fallback` when the estimate fails.
    pub(crate) async fn refresh_allocation(
        &self,
        state: &mut VaultState,
        index: usize,
        fallback: u64,
    ) {
        let strategy = state.allocations[index].strategy;
        let estimate = match state.adapter(&strategy) {
            Ok(adapter) => self.estimate(&adapter).await,
            Err(e) => Err(e),
        };
        state.allocations[index].current_assets = estimate.unwrap_or(fallback);
    }

    /// Re-measure every active strategy and return the fresh total.
    ///
    /// A strategy that cannot be measured keeps its last known value.
    pub(crate) async fn refresh_total(&self, state: &mut VaultState) -> VaultResult<u64> {
        for index in 0..state.allocations.len() {
            if !state.allocations[index].active {
                continue;
            }
            let stale = state.allocations[index].current_assets;
            self.refresh_allocation(state, index, stale).await;
        }
        state.book_total()
    }

    /// Total assets without touching state; failed estimates degrade to the
    /// last known value
    async fn measure_total(&self, state: &VaultState) -> VaultResult<u64> {
        let mut total = state.idle;
        for allocation in state.allocations.iter().filter(|a| a.active) {
            let value = match state.adapter(&allocation.strategy) {
                Ok(adapter) => match self.estimate(&adapter).await {
                    Ok(v) => v,
                    Err(_) => {
                        warn!(
                            strategy = %hex::encode(&allocation.strategy[..4]),
                            last_known = allocation.current_assets,
                            "using stale strategy estimate"
                        );
                        allocation.current_assets
                    }
                },
                Err(_) => allocation.current_assets,
            };
            total = safe_add(total, value)?;
        }
        Ok(total)
    }

    /// Pull up to `needed` from strategies into idle, in allocation order.
    ///
    /// Partial amounts are accepted and the walk continues with the next
    /// strategy. Returns the total recovered.
    pub(crate) async fn withdraw_from_strategies(
        &self,
        state: &mut VaultState,
        needed: u64,
        now: u64,
    ) -> VaultResult<u64> {
        let mut recovered: u64 = 0;
        for index in 0..state.allocations.len() {
            if recovered >= needed {
                break;
            }
            let allocation = &state.allocations[index];
            if !allocation.active || allocation.current_assets == 0 {
                continue;
            }
            let strategy = allocation.strategy;
            let held = allocation.current_assets;
            let request = (needed - recovered).min(held);
            let adapter = state.adapter(&strategy)?;

            match self.call_adapter(strategy, "withdraw", adapter.withdraw(request)).await {
                Ok(actual) => {
                    recovered = safe_add(recovered, actual)?;
                    state.idle = safe_add(state.idle, actual)?;
                    self.refresh_allocation(state, index, held.saturating_sub(actual)).await;
                    debug!(
                        strategy = %hex::encode(&strategy[..4]),
                        request,
                        actual,
                        "pulled liquidity"
                    );
                }
                Err(e) => record_strategy_failure(state, strategy, "withdraw", &e, now),
            }
        }
        Ok(recovered)
    }

    /// Make sure idle covers `amount`, pulling from strategies if needed
    pub(crate) async fn ensure_liquidity(
        &self,
        state: &mut VaultState,
        amount: u64,
        now: u64,
    ) -> VaultResult<()> {
        if state.idle >= amount {
            return Ok(());
        }
        let shortfall = amount - state.idle;
        self.withdraw_from_strategies(state, shortfall, now).await?;
        if state.idle < amount {
            warn!(
                idle = state.idle,
                requested = amount,
                "liquidity shortfall after draining strategies"
            );
            return Err(VaultError::InsufficientLiquidity {
                available: state.idle,
                requested: amount,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Mutation bracket
    // ------------------------------------------------------------------------

    /// Open an asset-changing operation: breaker must be normal, then
    /// re-measure and check for losses since the last operation.
    pub(crate) async fn begin_mutation(
        &self,
        state: &mut VaultState,
        actor: Address,
        operation: &str,
        now: u64,
    ) -> VaultResult<u64> {
        state.ensure_breaker_normal()?;
        let (measured, tripped) = self.check_prior_loss(state, actor, operation, now).await?;
        if tripped {
            return Err(VaultError::Paused);
        }
        Ok(measured)
    }

    /// Re-measure and compare with the total left by the previous
    /// operation. A loss past the threshold trips the breaker and the
    /// measured total becomes the new baseline.
    ///
    /// Returns the measured total and whether the breaker tripped.
    pub(crate) async fn check_prior_loss(
        &self,
        state: &mut VaultState,
        actor: Address,
        operation: &str,
        now: u64,
    ) -> VaultResult<(u64, bool)> {
        let measured = self.refresh_total(state).await?;
        let previous = state.total_assets_cache;
        let Some(trigger) = circuit_breaker::check_loss_circuit_breaker(
            &mut state.breaker,
            actor,
            operation,
            previous,
            measured,
            now,
        ) else {
            return Ok((measured, false));
        };
        on_breaker_tripped(state, actor, &trigger, previous, measured);
        self.settle(state, measured, now);
        Ok((measured, true))
    }

    /// Close an asset-changing operation: compare `expected` with the
    /// measured result, trip the breaker on loss, record the new total.
    pub(crate) fn finish_mutation(
        &self,
        state: &mut VaultState,
        actor: Address,
        operation: &str,
        expected: u64,
        now: u64,
    ) -> VaultResult<u64> {
        let actual = state.book_total()?;
        if let Some(trigger) = circuit_breaker::check_loss_circuit_breaker(
            &mut state.breaker,
            actor,
            operation,
            expected,
            actual,
            now,
        ) {
            on_breaker_tripped(state, actor, &trigger, expected, actual);
        }
        self.settle(state, actual, now);
        Ok(actual)
    }

    /// Record `total` as the latest observation
    pub(crate) fn settle(&self, state: &mut VaultState, total: u64, now: u64) {
        state.total_assets_cache = total;
        state.performance.record(total, state.ledger.total_shares, now);
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// Idle balance plus current strategy estimates
    pub async fn total_assets(&self) -> VaultResult<u64> {
        let state = self.state.read().await;
        self.measure_total(&state).await
    }

    pub async fn total_shares(&self) -> u64 {
        self.state.read().await.ledger.total_shares
    }

    pub async fn idle_assets(&self) -> u64 {
        self.state.read().await.idle
    }

    pub async fn balance_of(&self, holder: &Address) -> u64 {
        self.state.read().await.ledger.balance_of(holder)
    }

    pub async fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.state.read().await.ledger.allowance(owner, spender)
    }

    pub async fn status(&self) -> VaultStatus {
        self.state.read().await.status
    }

    /// Shares `assets` are worth at the current rate
    pub async fn convert_to_shares(&self, assets: u64, rounding: Rounding) -> VaultResult<u64> {
        let state = self.state.read().await;
        let total = self.measure_total(&state).await?;
        math::convert_to_shares(assets, state.ledger.total_shares, total, rounding)
    }

    /// Assets `shares` are worth at the current rate
    pub async fn convert_to_assets(&self, shares: u64, rounding: Rounding) -> VaultResult<u64> {
        let state = self.state.read().await;
        let total = self.measure_total(&state).await?;
        math::convert_to_assets(shares, state.ledger.total_shares, total, rounding)
    }

    /// Shares minted for depositing `assets`
    pub async fn preview_deposit(&self, assets: u64) -> VaultResult<u64> {
        self.convert_to_shares(assets, Rounding::Down).await
    }

    /// Assets required to mint `shares`
    pub async fn preview_mint(&self, shares: u64) -> VaultResult<u64> {
        self.convert_to_assets(shares, Rounding::Up).await
    }

    /// Shares burned to withdraw `assets`
    pub async fn preview_withdraw(&self, assets: u64) -> VaultResult<u64> {
        self.convert_to_shares(assets, Rounding::Up).await
    }

    /// Assets paid for redeeming `shares`
    pub async fn preview_redeem(&self, shares: u64) -> VaultResult<u64> {
        self.convert_to_assets(shares, Rounding::Down).await
    }

    pub async fn max_deposit(&self, _receiver: &Address) -> VaultResult<u64> {
        let state = self.state.read().await;
        if !state.status.accepts_deposits() || state.breaker.active {
            return Ok(0);
        }
        Ok(u64::MAX - self.measure_total(&state).await?)
    }

    pub async fn max_mint(&self, _receiver: &Address) -> VaultResult<u64> {
        let state = self.state.read().await;
        if !state.status.accepts_deposits() || state.breaker.active {
            return Ok(0);
        }
        Ok(u64::MAX - state.ledger.total_shares)
    }

    /// Assets `owner` could withdraw, ignoring strategy liquidity limits
    pub async fn max_withdraw(&self, owner: &Address) -> VaultResult<u64> {
        let state = self.state.read().await;
        if !state.status.allows_exit() || state.breaker.active {
            return Ok(0);
        }
        let total = self.measure_total(&state).await?;
        let shares = state.ledger.balance_of(owner);
        math::convert_to_assets(shares, state.ledger.total_shares, total, Rounding::Down)
    }

    pub async fn max_redeem(&self, owner: &Address) -> VaultResult<u64> {
        let state = self.state.read().await;
        if !state.status.allows_exit() || state.breaker.active {
            return Ok(0);
        }
        Ok(state.ledger.balance_of(owner))
    }

    /// Take all events recorded since the last drain
    pub async fn drain_events(&self) -> Vec<VaultEvent> {
        self.state.write().await.events.drain()
    }

    // ------------------------------------------------------------------------
    // Deposits
    // ------------------------------------------------------------------------

    /// Deposit `assets` and mint shares to `receiver`
    pub async fn deposit(
        &self,
        auth: &AuthContext,
        assets: u64,
        receiver: Address,
    ) -> VaultResult<u64> {
        require_positive(assets)?;
        require_address(&receiver, "receiver cannot be zero address")?;
        let now = self.now();
        let mut state = self.state.write().await;
        state.ensure_active()?;

        let before = self.begin_mutation(&mut state, auth.caller, "deposit", now).await?;
        let supply = state.ledger.total_shares;
        let shares = math::convert_to_shares(assets, supply, before, Rounding::Down)?;
        require_non_dust(assets, shares)?;

        self.commit_deposit(&mut state, auth.caller, receiver, assets, shares, before, now)?;
        info!(receiver = %hex::encode(&receiver[..4]), assets, shares, "deposit");
        Ok(shares)
    }

    /// Mint exactly `shares` to `receiver`, pulling the required assets
    pub async fn mint(
        &self,
        auth: &AuthContext,
        shares: u64,
        receiver: Address,
    ) -> VaultResult<u64> {
        require_positive(shares)?;
        require_address(&receiver, "receiver cannot be zero address")?;
        let now = self.now();
        let mut state = self.state.write().await;
        state.ensure_active()?;

        let before = self.begin_mutation(&mut state, auth.caller, "mint", now).await?;
        let supply = state.ledger.total_shares;
        if supply > 0 && before == 0 {
            return Err(VaultError::SharesWithoutAssets { total_shares: supply });
        }
        let assets = math::convert_to_assets(shares, supply, before, Rounding::Up)?;
        require_non_dust(shares, assets)?;

        self.commit_deposit(&mut state, auth.caller, receiver, assets, shares, before, now)?;
        info!(receiver = %hex::encode(&receiver[..4]), assets, shares, "mint");
        Ok(assets)
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_deposit(
        &self,
        state: &mut VaultState,
        caller: Address,
        receiver: Address,
        assets: u64,
        shares: u64,
        before: u64,
        now: u64,
    ) -> VaultResult<()> {
        let mut ledger = state.ledger.clone();
        ledger.mint(receiver, shares)?;
        if let Err(e) = ledger.check_consistency() {
            error!(error = %e, fatal = e.is_fatal(), "deposit aborted: share supply mismatch");
            return Err(e);
        }

        state.ledger = ledger;
        state.idle = safe_add(state.idle, assets)?;
        state.events.emit(VaultEvent::Deposit { caller, receiver, assets, shares, timestamp: now });
        self.finish_mutation(state, caller, "deposit", safe_add(before, assets)?, now)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Withdrawals
    // ------------------------------------------------------------------------

    /// Withdraw exactly `assets` to `receiver`, burning `owner`'s shares
    pub async fn withdraw(
        &self,
        auth: &AuthContext,
        assets: u64,
        receiver: Address,
        owner: Address,
    ) -> VaultResult<u64> {
        require_positive(assets)?;
        require_address(&receiver, "receiver cannot be zero address")?;
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_exit_allowed(&state)?;

        let before = self.begin_mutation(&mut state, auth.caller, "withdraw", now).await?;
        let supply = state.ledger.total_shares;
        let shares = math::convert_to_shares(assets, supply, before, Rounding::Up)?;

        self.exit(&mut state, auth, "withdraw", assets, shares, receiver, owner, before, now)
            .await?;
        info!(owner = %hex::encode(&owner[..4]), assets, shares, "withdraw");
        Ok(shares)
    }

    /// Redeem exactly `shares` of `owner`, paying assets to `receiver`
    pub async fn redeem(
        &self,
        auth: &AuthContext,
        shares: u64,
        receiver: Address,
        owner: Address,
    ) -> VaultResult<u64> {
        require_positive(shares)?;
        require_address(&receiver, "receiver cannot be zero address")?;
        let now = self.now();
        let mut state = self.state.write().await;
        ensure_exit_allowed(&state)?;

        let before = self.begin_mutation(&mut state, auth.caller, "redeem", now).await?;
        let supply = state.ledger.total_shares;
        let assets = math::convert_to_assets(shares, supply, before, Rounding::Down)?;
        require_non_dust(shares, assets)?;

        self.exit(&mut state, auth, "redeem", assets, shares, receiver, owner, before, now).await?;
        info!(owner = %hex::encode(&owner[..4]), assets, shares, "redeem");
        Ok(assets)
    }

    #[allow(clippy::too_many_arguments)]
    async fn exit(
        &self,
        state: &mut VaultState,
        auth: &AuthContext,
        operation: &str,
        assets: u64,
        shares: u64,
        receiver: Address,
        owner: Address,
        before: u64,
        now: u64,
    ) -> VaultResult<()> {
        let delegated = auth.caller != owner;
        if delegated {
            let available = state.ledger.allowance(&owner, &auth.caller);
            if available < shares {
                return Err(VaultError::InsufficientAllowance { available, requested: shares });
            }
        }
        let balance = state.ledger.balance_of(&owner);
        if balance < shares {
            return Err(VaultError::InsufficientBalance { available: balance, requested: shares });
        }

        self.ensure_liquidity(state, assets, now).await?;

        let mut ledger = state.ledger.clone();
        if delegated {
            ledger.spend_allowance(&owner, &auth.caller, shares)?;
        }
        ledger.burn(&owner, shares)?;
        if let Err(e) = ledger.check_consistency() {
            error!(error = %e, fatal = e.is_fatal(), "withdrawal aborted: share supply mismatch");
            return Err(e);
        }
        let idle = safe_sub(state.idle, assets)?;

        state.ledger = ledger;
        state.idle = idle;
        state.events.emit(VaultEvent::Withdraw {
            caller: auth.caller,
            receiver,
            owner,
            assets,
            shares,
            timestamp: now,
        });
        self.finish_mutation(state, auth.caller, operation, before.saturating_sub(assets), now)?;
        Ok(())
    }

    /// Let `spender` burn up to `shares` of the caller's shares
    pub async fn approve(
        &self,
        auth: &AuthContext,
        spender: Address,
        shares: u64,
    ) -> VaultResult<()> {
        let now = self.now();
        let mut state = self.state.write().await;
        state.ledger.approve(auth.caller, spender, shares)?;
        state.events.emit(VaultEvent::Approval {
            owner: auth.caller,
            spender,
            shares,
            timestamp: now,
        });
        debug!(
            owner = %hex::encode(&auth.caller[..4]),
            spender = %hex::encode(&spender[..4]),
            shares,
            "approval"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Admin pause: Active -> Paused
    pub async fn pause(&self, auth: &AuthContext) -> VaultResult<()> {
        auth.require(Permission::Pause)?;
        self.transition(auth, &[VaultStatus::Active], VaultStatus::Paused).await
    }

    /// Guardian pause: Active | Paused -> EmergencyPaused
    pub async fn emergency_pause(&self, auth: &AuthContext) -> VaultResult<()> {
        auth.require(Permission::EmergencyPause)?;
        let from = [VaultStatus::Active, VaultStatus::Paused];
        self.transition(auth, &from, VaultStatus::EmergencyPaused).await
    }

    /// Admin unpause: Paused | EmergencyPaused -> Active
    pub async fn unpause(&self, auth: &AuthContext) -> VaultResult<()> {
        auth.require(Permission::Pause)?;
        let from = [VaultStatus::Paused, VaultStatus::EmergencyPaused];
        self.transition(auth, &from, VaultStatus::Active).await
    }

    async fn transition(
        &self,
        auth: &AuthContext,
        from: &[VaultStatus],
        to: VaultStatus,
    ) -> VaultResult<()> {
        let now = self.now();
        let mut state = self.state.write().await;
        let old_status = state.status;
        if !from.contains(&old_status) {
            return Err(VaultError::VaultNotActive { status: old_status });
        }
        state.status = to;
        state.events.emit(VaultEvent::StatusChanged {
            actor: auth.caller,
            old_status,
            new_status: to,
            timestamp: now,
        });
        warn!(
            actor = %hex::encode(&auth.caller[..4]),
            from = ?old_status,
            to = ?to,
            "vault status changed"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Circuit breaker
    // ------------------------------------------------------------------------

    /// Trip the breaker manually
    pub async fn trigger_circuit_breaker(
        &self,
        auth: &AuthContext,
        reason: &str,
        loss_bps: u64,
    ) -> VaultResult<()> {
        auth.require(Permission::TriggerBreaker)?;
        let now = self.now();
        let mut state = self.state.write().await;
        let trigger = circuit_breaker::trigger_circuit_breaker(
            &mut state.breaker,
            auth.caller,
            reason,
            loss_bps,
            now,
        )?;
        state.events.emit(VaultEvent::CircuitBreakerTriggered {
            actor: auth.caller,
            source: trigger.source,
            loss_bps,
            timestamp: now,
        });
        error!(
            actor = %hex::encode(&auth.caller[..4]),
            reason,
            loss_bps,
            "circuit breaker triggered manually"
        );
        Ok(())
    }

    /// Reset the breaker once its cooldown has elapsed
    pub async fn reset_circuit_breaker(&self, auth: &AuthContext) -> VaultResult<()> {
        auth.require(Permission::ResetBreaker)?;
        let now = self.now();
        let mut state = self.state.write().await;
        circuit_breaker::reset_circuit_breaker(&mut state.breaker, auth.caller, now)?;
        state.events.emit(VaultEvent::CircuitBreakerReset { actor: auth.caller, timestamp: now });
        info!(actor = %hex::encode(&auth.caller[..4]), "circuit breaker reset");
        Ok(())
    }

    /// Reset the breaker ignoring the cooldown
    pub async fn emergency_reset(&self, auth: &AuthContext) -> VaultResult<()> {
        auth.require(Permission::EmergencyReset)?;
        let now = self.now();
        let mut state = self.state.write().await;
        let remaining_cooldown =
            circuit_breaker::emergency_reset_circuit_breaker(&mut state.breaker, auth.caller, now)?;
        state.events.emit(VaultEvent::CircuitBreakerEmergencyReset {
            actor: auth.caller,
            remaining_cooldown,
            timestamp: now,
        });
        warn!(
            actor = %hex::encode(&auth.caller[..4]),
            remaining_cooldown,
            "circuit breaker emergency reset"
        );
        Ok(())
    }

    /// Update threshold and/or cooldown; the current state is untouched
    pub async fn set_circuit_breaker_params(
        &self,
        auth: &AuthContext,
        loss_threshold_bps: Option<u64>,
        cooldown_secs: Option<u64>,
    ) -> VaultResult<()> {
        auth.require(Permission::UpdateParams)?;
        let now = self.now();
        let mut state = self.state.write().await;
        circuit_breaker::update_circuit_breaker_config(
            &mut state.breaker,
            loss_threshold_bps,
            cooldown_secs,
        )?;
        let loss_threshold_bps = state.breaker.loss_threshold_bps;
        let cooldown_secs = state.breaker.cooldown_secs;
        state.events.emit(VaultEvent::BreakerParametersUpdated {
            loss_threshold_bps,
            cooldown_secs,
            timestamp: now,
        });
        info!(loss_threshold_bps, cooldown_secs, "circuit breaker parameters updated");
        Ok(())
    }

    pub async fn circuit_breaker(&self) -> CircuitBreakerState {
        self.state.read().await.breaker.clone()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic vault address from its identity
fn vault_address(identity: &VaultIdentity) -> Address {
    let label = format!(
        "{}:{}:{}",
        identity.symbol,
        hex::encode(identity.asset),
        hex::encode(identity.admin)
    );
    derive_id("yieldvault:vault", &label)
}

fn ensure_exit_allowed(state: &VaultState) -> VaultResult<()> {
    if !state.status.allows_exit() {
        return Err(VaultError::VaultNotActive { status: state.status });
    }
    Ok(())
}

fn on_breaker_tripped(
    state: &mut VaultState,
    actor: Address,
    trigger: &BreakerTrigger,
    expected: u64,
    actual: u64,
) {
    error!(
        loss_bps = trigger.loss_bps,
        threshold_bps = trigger.threshold_bps,
        expected,
        actual,
        source = ?trigger.source,
        "circuit breaker tripped"
    );
    state.events.emit(VaultEvent::CircuitBreakerTriggered {
        actor,
        source: trigger.source.clone(),
        loss_bps: trigger.loss_bps,
        timestamp: trigger.triggered_at,
    });
}

/// Log and record a failed strategy call inside a batch operation
pub(crate) fn record_strategy_failure(
    state: &mut VaultState,
    strategy: StrategyId,
    operation: &str,
    err: &VaultError,
    now: u64,
) {
    let reason = match err {
        VaultError::AdapterFailure { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    state.events.emit(VaultEvent::StrategyFailed {
        strategy,
        operation: operation.to_string(),
        reason,
        timestamp: now,
    });
}
