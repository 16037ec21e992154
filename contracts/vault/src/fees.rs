//! Fee Collection
//!
//! Runs the fee engine against live vault state. The performance fee is
//! taken inside `harvest_yield`; this module collects the management fee
//! and administers fee parameters.

use tracing::info;
use yieldvault_common::access_control::{AuthContext, Permission};
use yieldvault_common::errors::VaultResult;
use yieldvault_common::events::{FeeKind, VaultEvent};
use yieldvault_common::fees::FeeLedger;
use yieldvault_common::math::safe_sub;
use yieldvault_common::types::Address;

use crate::vault::{Vault, VaultState};

impl Vault {
    /// Charge one day of management fee and pay it to the fee recipient.
    ///
    /// Cadence is the caller's responsibility: every call charges
    /// `total_assets * bps / 10000 / 365`.
    pub async fn collect_fees(&self, auth: &AuthContext) -> VaultResult<u64> {
        auth.require(Permission::CollectFees)?;
        let now = self.now();
        let mut state = self.state.write().await;
        state.ensure_active()?;

        let before = self.begin_mutation(&mut state, auth.caller, "collect_fees", now).await?;
        let fee = state.fees.daily_management_fee(before)?;
        if fee == 0 {
            state.fees.last_management_collection = now;
            return Ok(0);
        }

        self.ensure_liquidity(&mut state, fee, now).await?;
        state.idle = safe_sub(state.idle, fee)?;
        state.fees.record_collection(FeeKind::Management, fee, now)?;
        let recipient = state.fees.recipient;
        state.events.emit(VaultEvent::FeesCollected {
            kind: FeeKind::Management,
            amount: fee,
            recipient,
            timestamp: now,
        });

        self.finish_mutation(&mut state, auth.caller, "collect_fees", before - fee, now)?;
        info!(fee, recipient = %hex::encode(&recipient[..4]), "management fee collected");
        Ok(fee)
    }

    pub async fn set_performance_fee(&self, auth: &AuthContext, fee_bps: u64) -> VaultResult<()> {
        auth.require(Permission::UpdateParams)?;
        let mut state = self.state.write().await;
        state.fees.set_performance_fee(fee_bps)?;
        self.fee_parameters_updated(&mut state);
        Ok(())
    }

    pub async fn set_management_fee(&self, auth: &AuthContext, fee_bps: u64) -> VaultResult<()> {
        auth.require(Permission::UpdateParams)?;
        let mut state = self.state.write().await;
        state.fees.set_management_fee(fee_bps)?;
        self.fee_parameters_updated(&mut state);
        Ok(())
    }

    pub async fn set_fee_recipient(
        &self,
        auth: &AuthContext,
        recipient: Address,
    ) -> VaultResult<()> {
        auth.require(Permission::UpdateParams)?;
        let mut state = self.state.write().await;
        state.fees.set_recipient(recipient)?;
        self.fee_parameters_updated(&mut state);
        Ok(())
    }

    /// Fee rates, recipient and cumulative collections
    pub async fn fee_ledger(&self) -> FeeLedger {
        self.state.read().await.fees.clone()
    }

    fn fee_parameters_updated(&self, state: &mut VaultState) {
        let fees = &state.fees;
        let event = VaultEvent::FeeParametersUpdated {
            performance_fee_bps: fees.performance_fee_bps,
            management_fee_bps: fees.management_fee_bps,
            recipient: fees.recipient,
            timestamp: self.now(),
        };
        info!(
            performance_fee_bps = fees.performance_fee_bps,
            management_fee_bps = fees.management_fee_bps,
            "fee parameters updated"
        );
        state.events.emit(event);
    }
}
