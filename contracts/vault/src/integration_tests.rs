//! Integration Tests
//!
//! End-to-end tests that drive the vault through its strategies.
//! A scriptable in-memory strategy stands in for real protocols so that
//! failures, timeouts, losses and liquidity shortfalls can be forced.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use yieldvault_common::access_control::{AuthContext, Role};
    use yieldvault_common::clock::ManualClock;
    use yieldvault_common::constants::allocation::REBALANCE_COOLDOWN_SECS;
    use yieldvault_common::constants::breaker::DEFAULT_COOLDOWN_SECS;
    use yieldvault_common::constants::time::YEAR;
    use yieldvault_common::errors::VaultError;
    use yieldvault_common::events::{TriggerSource, VaultEvent};
    use yieldvault_common::math::Rounding;
    use yieldvault_common::types::{Address, StrategyId, VaultStatus};
    use yieldvault_strategy::{
        strategy_id_from_name, LendingMarketConfig, LendingStrategy, StrategyAdapter, StrategyError,
        StrategyInfo, StrategyResult,
    };

    use crate::*;

    const START: u64 = 1_700_000_000;

    fn admin() -> Address {
        [1u8; 32]
    }

    fn alice() -> Address {
        [2u8; 32]
    }

    fn bob() -> Address {
        [3u8; 32]
    }

    fn fee_recipient() -> Address {
        [9u8; 32]
    }

    fn admin_ctx() -> AuthContext {
        AuthContext::with_roles(admin(), &[Role::Admin])
    }

    fn keeper() -> AuthContext {
        AuthContext::with_roles([4u8; 32], &[Role::Keeper])
    }

    fn strategist() -> AuthContext {
        AuthContext::with_roles([6u8; 32], &[Role::Strategist])
    }

    fn guardian() -> AuthContext {
        AuthContext::with_roles([5u8; 32], &[Role::Guardian])
    }

    // ============================================================================
    // Scriptable strategy
    // ============================================================================

    #[derive(Default)]
    struct MockState {
        balance: u64,
        harvestable: u64,
        failing: Vec<&'static str>,
        slow: Vec<&'static str>,
        delay: Duration,
        deposit_haircut_bps: u64,
        withdraw_cap: Option<u64>,
    }

    struct MockStrategy {
        id: StrategyId,
        name: String,
        state: Mutex<MockState>,
    }

    impl MockStrategy {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                id: strategy_id_from_name(name),
                name: name.to_string(),
                state: Mutex::new(MockState::default()),
            })
        }

        fn fail_on(&self, operation: &'static str) {
            self.state.lock().failing.push(operation);
        }

        fn heal(&self) {
            self.state.lock().failing.clear();
        }

        fn slow_on(&self, operation: &'static str, delay: Duration) {
            let mut state = self.state.lock();
            state.slow.push(operation);
            state.delay = delay;
        }

        /// Deposits lose this share on the way in
        fn set_deposit_haircut(&self, bps: u64) {
            self.state.lock().deposit_haircut_bps = bps;
        }

        /// At most this much is released per withdraw call
        fn set_withdraw_cap(&self, cap: Option<u64>) {
            self.state.lock().withdraw_cap = cap;
        }

        /// Unrealized appreciation
        fn appreciate(&self, amount: u64) {
            self.state.lock().balance += amount;
        }

        fn lose_bps(&self, bps: u64) {
            let mut state = self.state.lock();
            let loss = state.balance * bps / 10_000;
            state.balance -= loss;
        }

        fn add_harvestable(&self, amount: u64) {
            self.state.lock().harvestable += amount;
        }

        fn balance(&self) -> u64 {
            self.state.lock().balance
        }

        async fn gate(&self, operation: &'static str) -> StrategyResult<()> {
            let (fail, delay) = {
                let state = self.state.lock();
                let delay = state.slow.contains(&operation).then_some(state.delay);
                (state.failing.contains(&operation), delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                let reason = format!("{operation} scripted to fail");
                return Err(StrategyError::Unavailable { reason });
            }
            Ok(())
        }

        fn release(&self, amount: u64) -> u64 {
            let mut state = self.state.lock();
            let actual = amount.min(state.balance).min(state.withdraw_cap.unwrap_or(u64::MAX));
            state.balance -= actual;
            actual
        }
    }

    #[async_trait::async_trait]
    impl StrategyAdapter for MockStrategy {
        fn id(&self) -> StrategyId {
            self.id
        }

        fn info(&self) -> StrategyInfo {
            StrategyInfo {
                name: self.name.clone(),
                protocol: "Mock".to_string(),
                risk_score: 5,
                apy_bps: 500,
            }
        }

        async fn estimated_total_assets(&self) -> StrategyResult<u64> {
            self.gate("estimated_total_assets").await?;
            Ok(self.balance())
        }

        async fn can_harvest(&self) -> StrategyResult<bool> {
            self.gate("can_harvest").await?;
            Ok(self.state.lock().harvestable > 0)
        }

        async fn deposit(&self, amount: u64) -> StrategyResult<()> {
            self.gate("deposit").await?;
            let mut state = self.state.lock();
            let haircut = amount * state.deposit_haircut_bps / 10_000;
            state.balance += amount - haircut;
            Ok(())
        }

        async fn withdraw(&self, amount: u64) -> StrategyResult<u64> {
            self.gate("withdraw").await?;
            Ok(self.release(amount))
        }

        async fn withdraw_all(&self) -> StrategyResult<u64> {
            self.gate("withdraw_all").await?;
            Ok(self.release(u64::MAX))
        }

        async fn harvest(&self) -> StrategyResult<u64> {
            self.gate("harvest").await?;
            let mut state = self.state.lock();
            Ok(std::mem::take(&mut state.harvestable))
        }

        async fn emergency_exit(&self) -> StrategyResult<u64> {
            self.gate("emergency_exit").await?;
            let mut state = self.state.lock();
            Ok(std::mem::take(&mut state.balance))
        }
    }

    // ============================================================================
    // Harness
    // ============================================================================

    fn vault_with(config: VaultConfig) -> (Vault, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let vault = Vault::new(&config, admin(), fee_recipient(), clock.clone()).unwrap();
        (vault, clock)
    }

    fn new_vault() -> (Vault, Arc<ManualClock>) {
        vault_with(VaultConfig::default())
    }

    async fn seeded(vault: &Vault, assets: u64) {
        vault.deposit(&AuthContext::user(alice()), assets, alice()).await.unwrap();
    }

    fn failed_on(events: &[VaultEvent], operation: &str) -> bool {
        events.iter().any(|e| {
            matches!(e, VaultEvent::StrategyFailed { operation: op, .. } if op == operation)
        })
    }

    async fn held(vault: &Vault, strategy: &StrategyId) -> u64 {
        vault
            .strategy_allocations()
            .await
            .into_iter()
            .find(|a| a.strategy == *strategy)
            .map(|a| a.current_assets)
            .unwrap()
    }

    // ============================================================================
    // Share accounting
    // ============================================================================

    #[tokio::test]
    async fn test_bootstrap_deposit_mints_one_to_one() {
        let (vault, _) = new_vault();
        let shares = vault.deposit(&AuthContext::user(alice()), 1_000, alice()).await.unwrap();

        assert_eq!(shares, 1_000);
        assert_eq!(vault.total_assets().await.unwrap(), 1_000);
        assert_eq!(vault.total_shares().await, 1_000);
    }

    #[tokio::test]
    async fn test_deposit_after_yield_gets_fewer_shares() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        a.appreciate(100);
        assert_eq!(vault.total_assets().await.unwrap(), 1_100);

        let shares = vault.deposit(&AuthContext::user(bob()), 110, bob()).await.unwrap();
        assert_eq!(shares, 100);
        assert_eq!(vault.total_shares().await, 1_100);
    }

    #[tokio::test]
    async fn test_deposit_grows_measured_total() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.appreciate(50);

        let shares = vault.deposit(&AuthContext::user(bob()), 105, bob()).await.unwrap();
        assert_eq!(shares, 100);
        assert_eq!(vault.total_assets().await.unwrap(), 1_155);
        assert_eq!(vault.vault_info().await.unwrap().total_assets, 1_155);
        assert!(!vault.circuit_breaker().await.active);
    }

    #[tokio::test]
    async fn test_total_loss_is_terminal_for_deposits() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        a.lose_bps(10_000);
        assert_eq!(
            vault.deposit(&AuthContext::user(bob()), 100, bob()).await,
            Err(VaultError::Paused)
        );
        vault.emergency_reset(&admin_ctx()).await.unwrap();

        let err = vault.deposit(&AuthContext::user(bob()), 100, bob()).await.unwrap_err();
        assert_eq!(err, VaultError::SharesWithoutAssets { total_shares: 1_000 });
        assert!(err.is_fatal());
        assert_eq!(
            vault.mint(&AuthContext::user(bob()), 10, bob()).await,
            Err(VaultError::SharesWithoutAssets { total_shares: 1_000 })
        );
        assert_eq!(vault.balance_of(&bob()).await, 0);
    }

    #[tokio::test]
    async fn test_round_trip_never_profits() {
        // (seed, appreciation, deposit)
        let cases = [
            (1_000, 100, 110),
            (1_000, 333, 7),
            (5_000, 1, 999),
            (10, 7, 3),
            (1_000_000, 999_999, 12_345),
        ];

        for (seed, gain, deposit) in cases {
            let (vault, _) = new_vault();
            seeded(&vault, seed).await;
            let a = MockStrategy::new("a");
            vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
            vault.rebalance(&keeper()).await.unwrap();
            a.appreciate(gain);

            let user = AuthContext::user(bob());
            let shares = vault.deposit(&user, deposit, bob()).await.unwrap();
            assert!(vault.convert_to_assets(shares, Rounding::Down).await.unwrap() <= deposit);
            let back = vault.redeem(&user, shares, bob(), bob()).await.unwrap();
            assert!(back <= deposit, "seed={seed} gain={gain}: paid {deposit}, got {back}");
        }
    }

    #[tokio::test]
    async fn test_dust_deposit_rejected() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.appreciate(9_000);

        // 9 assets at 10 assets/share round to zero shares
        assert!(matches!(
            vault.deposit(&AuthContext::user(bob()), 9, bob()).await,
            Err(VaultError::InvalidAmount { .. })
        ));
        assert_eq!(vault.balance_of(&bob()).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_deposits_serialize() {
        let (vault, _) = new_vault();
        let vault = Arc::new(vault);

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let vault = vault.clone();
            handles.push(tokio::spawn(async move {
                let user = [100 + i; 32];
                vault.deposit(&AuthContext::user(user), 100, user).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 100);
        }

        assert_eq!(vault.total_shares().await, 2_000);
        assert_eq!(vault.total_assets().await.unwrap(), 2_000);
        assert_eq!(vault.balance_of(&[107u8; 32]).await, 100);
    }

    // ============================================================================
    // Allocation manager
    // ============================================================================

    #[tokio::test]
    async fn test_rebalance_splits_by_target() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 6_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 4_000).await.unwrap();

        let report = vault.rebalance(&keeper()).await.unwrap();
        assert_eq!(report.total_assets, 1_000);
        assert_eq!((report.succeeded, report.failed), (2, 0));
        assert_eq!(report.outcomes[0].result, Ok(RebalanceAction::Deposited(600)));
        assert_eq!(a.balance(), 600);
        assert_eq!(b.balance(), 400);
        assert_eq!(vault.idle_assets().await, 0);
        assert_eq!(vault.total_assets().await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_rebalance_pulls_excess_after_reweight() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 6_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 4_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        vault.update_allocation(&strategist(), &a.id(), 2_000).await.unwrap();
        clock.advance(REBALANCE_COOLDOWN_SECS);
        let report = vault.rebalance(&keeper()).await.unwrap();

        assert_eq!(
            report.outcomes[0].result,
            Ok(RebalanceAction::Withdrew { requested: 400, received: 400 })
        );
        assert_eq!(a.balance(), 200);
        assert_eq!(b.balance(), 400);
        assert_eq!(vault.idle_assets().await, 400);
    }

    #[tokio::test]
    async fn test_allocation_cap_leaves_state_unchanged() {
        let (vault, _) = new_vault();
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        let c = MockStrategy::new("c");
        vault.add_strategy(&strategist(), a.clone(), 6_000).await.unwrap();

        assert_eq!(
            vault.add_strategy(&strategist(), b.clone(), 5_000).await,
            Err(VaultError::AllocationExceeded { requested_bps: 5_000, available_bps: 4_000 })
        );
        assert_eq!(vault.strategy_allocations().await.len(), 1);

        vault.add_strategy(&strategist(), b.clone(), 4_000).await.unwrap();
        assert_eq!(
            vault.update_allocation(&strategist(), &a.id(), 7_000).await,
            Err(VaultError::AllocationExceeded { requested_bps: 7_000, available_bps: 6_000 })
        );
        assert_eq!(vault.strategy_allocations().await[0].target_bps, 6_000);

        assert_eq!(
            vault.add_strategy(&strategist(), a.clone(), 0).await,
            Err(VaultError::StrategyAlreadyExists { strategy: a.id() })
        );
        assert_eq!(
            vault.add_strategy(&strategist(), c.clone(), 10_001).await,
            Err(VaultError::InvalidAllocation { bps: 10_001 })
        );
        assert_eq!(
            vault.update_allocation(&strategist(), &c.id(), 100).await,
            Err(VaultError::StrategyNotFound { strategy: c.id() })
        );
    }

    #[tokio::test]
    async fn test_failing_strategy_does_not_stop_rebalance() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        a.fail_on("deposit");
        vault.drain_events().await;

        let report = vault.rebalance(&keeper()).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert!(matches!(report.outcomes[0].result, Err(VaultError::AdapterFailure { .. })));
        assert_eq!(b.balance(), 500);
        assert_eq!(vault.idle_assets().await, 500);
        assert_eq!(vault.vault_info().await.unwrap().last_rebalance, START);
        assert!(failed_on(&vault.drain_events().await, "deposit"));

        let err = vault.rebalance(&keeper()).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::RebalanceCooldownActive {
                ready_at: START + REBALANCE_COOLDOWN_SECS,
                now: START
            }
        );
        assert!(err.is_expected_rejection());

        a.heal();
        clock.advance(REBALANCE_COOLDOWN_SECS);
        vault.rebalance(&keeper()).await.unwrap();
        assert_eq!(a.balance(), 500);
        assert_eq!(vault.idle_assets().await, 0);
    }

    #[tokio::test]
    async fn test_adapter_timeout_is_adapter_failure() {
        let config = VaultConfig { adapter_timeout_ms: 50, ..VaultConfig::default() };
        let (vault, _) = vault_with(config);
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        a.slow_on("deposit", Duration::from_millis(500));

        let report = vault.rebalance(&keeper()).await.unwrap();
        match &report.outcomes[0].result {
            Err(VaultError::AdapterFailure { strategy, reason }) => {
                assert_eq!(*strategy, a.id());
                assert!(reason.contains("timed out"), "{reason}");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(a.balance(), 0);
        assert_eq!(b.balance(), 500);
        assert_eq!(vault.total_assets().await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_rebalance_requires_keeper() {
        let (vault, _) = new_vault();
        assert!(matches!(
            vault.rebalance(&AuthContext::user(alice())).await,
            Err(VaultError::Unauthorized { permission: "rebalance", .. })
        ));
        assert!(matches!(
            vault.add_strategy(&keeper(), MockStrategy::new("a"), 1_000).await,
            Err(VaultError::Unauthorized { .. })
        ));
    }

    // ============================================================================
    // Withdrawals across strategies
    // ============================================================================

    async fn split_vault() -> (Vault, Arc<MockStrategy>, Arc<MockStrategy>) {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        assert_eq!(vault.idle_assets().await, 0);
        (vault, a, b)
    }

    #[tokio::test]
    async fn test_withdraw_pulls_strategies_in_order() {
        let (vault, a, b) = split_vault().await;
        let user = AuthContext::user(alice());

        let shares = vault.withdraw(&user, 700, alice(), alice()).await.unwrap();
        assert_eq!(shares, 700);
        assert_eq!(a.balance(), 0);
        assert_eq!(b.balance(), 300);
        assert_eq!(vault.idle_assets().await, 0);
        assert_eq!(vault.balance_of(&alice()).await, 300);
        assert_eq!(held(&vault, &b.id()).await, 300);
    }

    #[tokio::test]
    async fn test_partial_release_moves_on_to_next_strategy() {
        let (vault, a, b) = split_vault().await;
        a.set_withdraw_cap(Some(300));

        vault.withdraw(&AuthContext::user(alice()), 700, alice(), alice()).await.unwrap();
        assert_eq!(a.balance(), 200);
        assert_eq!(b.balance(), 100);
        assert_eq!(vault.total_assets().await.unwrap(), 300);
        assert!(!vault.circuit_breaker().await.active);
    }

    #[tokio::test]
    async fn test_liquidity_shortfall_burns_nothing() {
        let (vault, a, b) = split_vault().await;
        a.set_withdraw_cap(Some(100));
        b.set_withdraw_cap(Some(100));

        assert_eq!(
            vault.withdraw(&AuthContext::user(alice()), 700, alice(), alice()).await,
            Err(VaultError::InsufficientLiquidity { available: 200, requested: 700 })
        );
        assert_eq!(vault.balance_of(&alice()).await, 1_000);
        assert_eq!(vault.total_shares().await, 1_000);
        // recovered assets stay idle and are still counted
        assert_eq!(vault.idle_assets().await, 200);
        assert_eq!(vault.total_assets().await.unwrap(), 1_000);

        a.set_withdraw_cap(None);
        vault.withdraw(&AuthContext::user(alice()), 700, alice(), alice()).await.unwrap();
    }

    // ============================================================================
    // Circuit breaker
    // ============================================================================

    #[tokio::test]
    async fn test_loss_during_rebalance_trips_breaker() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        a.set_deposit_haircut(600);
        vault.drain_events().await;

        // the rebalance itself commits; the 6% loss trips the breaker
        vault.rebalance(&keeper()).await.unwrap();
        let breaker = vault.circuit_breaker().await;
        assert!(breaker.active);
        assert_eq!(breaker.last_triggered_at, START);

        let events = vault.drain_events().await;
        assert!(events.iter().any(|e| matches!(
            e,
            VaultEvent::CircuitBreakerTriggered {
                source: TriggerSource::Automatic { operation },
                loss_bps: 600,
                ..
            } if operation == "rebalance"
        )));

        assert_eq!(
            vault.deposit(&AuthContext::user(bob()), 100, bob()).await,
            Err(VaultError::Paused)
        );
        assert_eq!(
            vault.redeem(&AuthContext::user(alice()), 10, alice(), alice()).await,
            Err(VaultError::Paused)
        );
        assert_eq!(vault.max_deposit(&bob()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_loss_between_operations_trips_on_next_call() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        a.lose_bps(600);
        assert_eq!(
            vault.deposit(&AuthContext::user(bob()), 100, bob()).await,
            Err(VaultError::Paused)
        );
        assert!(vault.circuit_breaker().await.active);
        assert_eq!(vault.balance_of(&bob()).await, 0);
    }

    #[tokio::test]
    async fn test_loss_below_threshold_tolerated() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        a.lose_bps(400);
        vault.deposit(&AuthContext::user(bob()), 96, bob()).await.unwrap();
        assert!(!vault.circuit_breaker().await.active);
    }

    #[tokio::test]
    async fn test_breaker_reset_at_cooldown_boundary() {
        let (vault, clock) = new_vault();
        vault.trigger_circuit_breaker(&guardian(), "oracle anomaly", 700).await.unwrap();

        clock.advance(DEFAULT_COOLDOWN_SECS - 1);
        assert_eq!(
            vault.reset_circuit_breaker(&guardian()).await,
            Err(VaultError::CooldownActive {
                ready_at: START + DEFAULT_COOLDOWN_SECS,
                now: START + DEFAULT_COOLDOWN_SECS - 1
            })
        );

        clock.advance(1);
        vault.reset_circuit_breaker(&guardian()).await.unwrap();
        assert_eq!(
            vault.reset_circuit_breaker(&guardian()).await,
            Err(VaultError::BreakerNotTripped)
        );
        seeded(&vault, 10).await;
    }

    #[tokio::test]
    async fn test_rebalance_refused_while_tripped() {
        let (vault, _) = new_vault();
        vault.add_strategy(&strategist(), MockStrategy::new("a"), 5_000).await.unwrap();
        vault.trigger_circuit_breaker(&guardian(), "manual", 500).await.unwrap();
        assert_eq!(vault.rebalance(&keeper()).await.unwrap_err(), VaultError::Paused);
        assert!(!vault.keeper_status().await.unwrap().rebalance_due);
    }

    // ============================================================================
    // Harvest and fees
    // ============================================================================

    #[tokio::test]
    async fn test_harvest_takes_performance_fee() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.add_harvestable(100);

        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!(report.harvested, 100);
        assert_eq!(report.performance_fee, 10);
        assert_eq!(report.outcomes[0].result, Ok(HarvestAction::Harvested(100)));
        assert_eq!(report.outcomes[1].result, Ok(HarvestAction::Skipped));

        assert_eq!(vault.idle_assets().await, 90);
        assert_eq!(vault.total_assets().await.unwrap(), 1_090);
        let info = vault.vault_info().await.unwrap();
        assert_eq!(info.total_yield_generated, 100);
        assert_eq!(vault.fee_ledger().await.performance_fees_collected, 10);

        assert_eq!(vault.harvest_yield(&keeper()).await, Err(VaultError::CannotHarvest));
    }

    #[tokio::test]
    async fn test_harvest_reports_failing_strategy() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.add_harvestable(50);
        b.add_harvestable(50);
        a.fail_on("harvest");

        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!(report.harvested, 50);
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(report.performance_fee, 5);
    }

    #[tokio::test]
    async fn test_harvest_with_every_check_failing_returns_report() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.fail_on("can_harvest");
        b.fail_on("can_harvest");

        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (0, 2));
        assert_eq!((report.harvested, report.performance_fee), (0, 0));
        for (outcome, strategy) in report.outcomes.iter().zip([a.id(), b.id()]) {
            assert_eq!(outcome.strategy, strategy);
            assert!(matches!(
                &outcome.result,
                Err(VaultError::AdapterFailure { reason, .. }) if reason.contains("can_harvest")
            ));
        }

        // one strategy failing and the other idle still reports the failure
        b.heal();
        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(report.outcomes[1].result, Ok(HarvestAction::Skipped));

        a.heal();
        assert_eq!(vault.harvest_yield(&keeper()).await, Err(VaultError::CannotHarvest));
    }

    #[tokio::test]
    async fn test_management_fee_pulls_from_strategy() {
        let (vault, _) = new_vault();
        seeded(&vault, 3_650_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        assert_eq!(vault.keeper_status().await.unwrap().management_fee_due, 100);
        assert_eq!(vault.collect_fees(&keeper()).await.unwrap(), 100);
        assert_eq!(a.balance(), 3_649_900);
        assert_eq!(vault.fee_ledger().await.management_fees_collected, 100);
        assert!(!vault.circuit_breaker().await.active);
    }

    // ============================================================================
    // Strategy removal and emergency exit
    // ============================================================================

    #[tokio::test]
    async fn test_remove_strategy_returns_assets_to_idle() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        assert_eq!(vault.remove_strategy(&strategist(), &a.id()).await.unwrap(), 1_000);
        assert_eq!(vault.idle_assets().await, 1_000);
        let allocations = vault.strategy_allocations().await;
        assert!(!allocations[0].active);
        assert_eq!(allocations[0].target_bps, 0);

        // retired records are kept but cannot be re-added
        assert_eq!(
            vault.add_strategy(&strategist(), a.clone(), 1_000).await,
            Err(VaultError::StrategyAlreadyExists { strategy: a.id() })
        );
        assert_eq!(
            vault.remove_strategy(&strategist(), &a.id()).await,
            Err(VaultError::StrategyNotFound { strategy: a.id() })
        );
    }

    #[tokio::test]
    async fn test_remove_strategy_survives_failed_exit() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 1_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 9_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        a.fail_on("withdraw_all");
        vault.drain_events().await;

        assert_eq!(vault.remove_strategy(&strategist(), &a.id()).await.unwrap(), 0);
        let allocations = vault.strategy_allocations().await;
        assert!(!allocations[0].active);
        assert_eq!(allocations[0].current_assets, 100);

        // 10% of assets stranded in the retired strategy
        assert!(vault.circuit_breaker().await.active);
        let events = vault.drain_events().await;
        assert!(failed_on(&events, "withdraw_all"));
        assert!(events
            .iter()
            .any(|e| matches!(e, VaultEvent::StrategyRemoved { recovered: 0, .. })));
    }

    #[tokio::test]
    async fn test_loss_before_removal_trips_breaker() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        vault.drain_events().await;

        // 10% of the vault gone before the removal starts
        a.lose_bps(2_000);
        assert_eq!(vault.remove_strategy(&strategist(), &b.id()).await.unwrap(), 500);
        assert_eq!(vault.idle_assets().await, 500);

        let breaker = vault.circuit_breaker().await;
        assert!(breaker.active);
        assert!(vault.drain_events().await.iter().any(|e| matches!(
            e,
            VaultEvent::CircuitBreakerTriggered {
                source: TriggerSource::Automatic { operation },
                loss_bps: 1_000,
                ..
            } if operation == "remove_strategy"
        )));
        assert_eq!(
            vault.deposit(&AuthContext::user(bob()), 100, bob()).await,
            Err(VaultError::Paused)
        );
    }

    #[tokio::test]
    async fn test_emergency_withdraw_deprecates_but_allows_exit() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        assert!(matches!(
            vault.emergency_withdraw(&guardian()).await,
            Err(VaultError::Unauthorized { .. })
        ));

        let report = vault.emergency_withdraw(&admin_ctx()).await.unwrap();
        assert_eq!(report.recovered, 1_000);
        assert_eq!(report.stranded, 0);
        assert_eq!(vault.status().await, VaultStatus::Deprecated);
        assert_eq!(vault.idle_assets().await, 1_000);

        assert_eq!(
            vault.deposit(&AuthContext::user(bob()), 10, bob()).await,
            Err(VaultError::VaultNotActive { status: VaultStatus::Deprecated })
        );
        assert_eq!(
            vault.rebalance(&keeper()).await.unwrap_err(),
            VaultError::VaultNotActive { status: VaultStatus::Deprecated }
        );
        assert!(vault.emergency_withdraw(&admin_ctx()).await.is_err());

        let user = AuthContext::user(alice());
        let assets = vault.redeem(&user, 1_000, alice(), alice()).await.unwrap();
        assert_eq!(assets, 1_000);
        assert_eq!(vault.total_shares().await, 0);
    }

    #[tokio::test]
    async fn test_emergency_withdraw_reports_stranded_value() {
        let (vault, _) = new_vault();
        seeded(&vault, 1_000).await;
        let a = MockStrategy::new("a");
        let b = MockStrategy::new("b");
        vault.add_strategy(&strategist(), a.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), b.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();
        b.fail_on("emergency_exit");

        let report = vault.emergency_withdraw(&admin_ctx()).await.unwrap();
        assert_eq!(report.recovered, 500);
        assert_eq!(report.stranded, 500);
        assert!(report.outcomes[1].result.is_err());
        // losses here do not block holders
        assert!(!vault.circuit_breaker().await.active);
        assert_eq!(
            vault.redeem(&AuthContext::user(alice()), 1_000, alice(), alice()).await.unwrap(),
            500
        );
    }

    // ============================================================================
    // Keeper view
    // ============================================================================

    #[tokio::test]
    async fn test_keeper_status() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000).await;
        assert!(!vault.keeper_status().await.unwrap().rebalance_due);

        let a = MockStrategy::new("a");
        vault.add_strategy(&strategist(), a.clone(), 10_000).await.unwrap();
        let status = vault.keeper_status().await.unwrap();
        assert!(status.rebalance_due);
        assert_eq!(status.rebalance_ready_at, 0);
        assert!(status.harvestable.is_empty());

        vault.rebalance(&keeper()).await.unwrap();
        a.add_harvestable(5);
        let status = vault.keeper_status().await.unwrap();
        assert!(!status.rebalance_due);
        assert_eq!(status.rebalance_ready_at, START + REBALANCE_COOLDOWN_SECS);
        assert_eq!(status.harvestable, vec![a.id()]);

        clock.advance(REBALANCE_COOLDOWN_SECS);
        assert!(vault.keeper_status().await.unwrap().rebalance_due);
    }

    // ============================================================================
    // Lending strategy end to end
    // ============================================================================

    fn lending(name: &str, apy_bps: u64, clock: &Arc<ManualClock>) -> Arc<LendingStrategy> {
        let config = LendingMarketConfig {
            name: name.to_string(),
            supply_apy_bps: apy_bps,
            ..LendingMarketConfig::default()
        };
        Arc::new(LendingStrategy::new(config, clock.clone()))
    }

    #[tokio::test]
    async fn test_year_of_lending_yield() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000_000).await;
        let market = lending("compound-usdc", 1_000, &clock);
        vault.add_strategy(&strategist(), market.clone(), 10_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        clock.advance(YEAR);
        assert_eq!(vault.total_assets().await.unwrap(), 1_100_000);

        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!(report.harvested, 100_000);
        assert_eq!(report.performance_fee, 10_000);
        assert_eq!(market.total_harvested(), 100_000);
        assert_eq!(vault.total_assets().await.unwrap(), 1_090_000);

        let metrics = vault.performance_metrics().await;
        assert_eq!(metrics.total_return_bps, 900);
        assert_eq!(metrics.apy_bps, 900);
        assert_eq!(metrics.max_drawdown_bps, 0);

        let summaries = vault.strategy_summaries().await;
        assert_eq!(summaries[0].info.as_ref().map(|i| i.protocol.as_str()), Some("Compound"));
    }

    #[tokio::test]
    async fn test_paused_market_skipped_by_harvest() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000_000).await;
        let open = lending("open", 1_000, &clock);
        let paused = lending("paused", 1_000, &clock);
        vault.add_strategy(&strategist(), open.clone(), 5_000).await.unwrap();
        vault.add_strategy(&strategist(), paused.clone(), 5_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        clock.advance(YEAR);
        paused.set_paused(true);
        let report = vault.harvest_yield(&keeper()).await.unwrap();
        assert_eq!(report.harvested, 50_000);
        assert_eq!(report.outcomes[1].result, Ok(HarvestAction::Skipped));
    }

    #[tokio::test]
    async fn test_snapshot_restore_rebinds_strategies() {
        let (vault, clock) = new_vault();
        seeded(&vault, 1_000).await;
        let market = lending("aave-usdc", 500, &clock);
        vault.add_strategy(&strategist(), market.clone(), 8_000).await.unwrap();
        vault.rebalance(&keeper()).await.unwrap();

        let bytes = vault.snapshot().await.encode().unwrap();
        let decoded = VaultSnapshot::decode(&bytes).unwrap();

        let config = VaultConfig::default();
        let missing = Vault::restore(decoded.clone(), &config, Vec::new(), clock.clone()).await;
        assert_eq!(missing.err(), Some(VaultError::StrategyNotFound { strategy: market.id() }));

        let adapters: Vec<Arc<dyn StrategyAdapter>> = vec![market.clone()];
        let restored = Vault::restore(decoded, &VaultConfig::default(), adapters, clock.clone())
            .await
            .unwrap();
        assert_eq!(restored.address(), vault.address());
        assert_eq!(restored.total_assets().await.unwrap(), 1_000);
        assert_eq!(held(&restored, &market.id()).await, 800);

        restored.withdraw(&AuthContext::user(alice()), 900, alice(), alice()).await.unwrap();
        assert_eq!(restored.total_assets().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_adapter_bound_to_one_vault() {
        let (first, clock) = new_vault();
        let market = lending("bound", 500, &clock);
        first.add_strategy(&strategist(), market.clone(), 5_000).await.unwrap();

        let other = VaultConfig { symbol: "yvOTHER".to_string(), ..VaultConfig::default() };
        let second = Vault::new(&other, admin(), fee_recipient(), clock.clone()).unwrap();
        assert!(matches!(
            second.add_strategy(&strategist(), market.clone(), 5_000).await,
            Err(VaultError::AdapterFailure { .. })
        ));
        assert!(second.strategy_allocations().await.is_empty());
    }
}
