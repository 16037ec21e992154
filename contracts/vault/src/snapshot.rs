//! Vault Snapshots
//!
//! Persistable image of vault state. Adapters are not part of the image;
//! `Vault::restore` rebinds them by strategy id.
//!
//! ## Encoding
//!
//! ```text
//! MAGIC (4) | VERSION (u16 LE) | SHA-256(body) (32) | body (borsh)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use tracing::info;
use yieldvault_common::circuit_breaker::CircuitBreakerState;
use yieldvault_common::clock::Clock;
use yieldvault_common::constants::{bps, snapshot};
use yieldvault_common::errors::{VaultError, VaultResult};
use yieldvault_common::events::EventLog;
use yieldvault_common::fees::FeeLedger;
use yieldvault_common::types::{
    active_allocation_bps, ShareLedger, StrategyAllocation, VaultIdentity, VaultStatus,
};
use yieldvault_strategy::StrategyAdapter;

use crate::config::VaultConfig;
use crate::metrics::PerformanceTracker;
use crate::vault::{Vault, VaultState};

const HEADER_LEN: usize = 4 + 2 + 32;

/// Serializable vault state
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VaultSnapshot {
    pub identity: VaultIdentity,
    pub ledger: ShareLedger,
    pub idle: u64,
    pub status: VaultStatus,
    pub allocations: Vec<StrategyAllocation>,
    pub breaker: CircuitBreakerState,
    pub fees: FeeLedger,
    pub last_rebalance: u64,
    pub total_yield_generated: u64,
    pub total_assets_cache: u64,
    pub performance: PerformanceTracker,
    pub created_at: u64,
    pub taken_at: u64,
}

impl VaultSnapshot {
    /// Encode with header and checksum
    pub fn encode(&self) -> VaultResult<Vec<u8>> {
        let body = borsh::to_vec(self)
            .map_err(|_| VaultError::InvalidSnapshot { reason: "encoding failed" })?;
        let checksum: [u8; 32] = Sha256::digest(&body).into();

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(&snapshot::MAGIC);
        bytes.extend_from_slice(&snapshot::VERSION.to_le_bytes());
        bytes.extend_from_slice(&checksum);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode and verify header and checksum
    pub fn decode(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(VaultError::InvalidSnapshot { reason: "truncated header" });
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if header[..4] != snapshot::MAGIC {
            return Err(VaultError::InvalidSnapshot { reason: "bad magic" });
        }
        if u16::from_le_bytes([header[4], header[5]]) != snapshot::VERSION {
            return Err(VaultError::InvalidSnapshot { reason: "unsupported version" });
        }
        let checksum: [u8; 32] = Sha256::digest(body).into();
        if header[6..] != checksum {
            return Err(VaultError::InvalidSnapshot { reason: "checksum mismatch" });
        }
        borsh::from_slice(body)
            .map_err(|_| VaultError::InvalidSnapshot { reason: "malformed body" })
    }

    /// Structural checks run before a snapshot is trusted
    pub fn verify(&self) -> VaultResult<()> {
        self.ledger.check_consistency()?;
        if active_allocation_bps(&self.allocations, None) > bps::MAX_TOTAL_ALLOCATION {
            return Err(VaultError::InvalidSnapshot { reason: "allocations exceed 100%" });
        }
        Ok(())
    }
}

impl Vault {
    /// Capture current state
    pub async fn snapshot(&self) -> VaultSnapshot {
        let taken_at = self.now();
        let state = self.state.read().await;
        VaultSnapshot {
            identity: self.identity().clone(),
            ledger: state.ledger.clone(),
            idle: state.idle,
            status: state.status,
            allocations: state.allocations.clone(),
            breaker: state.breaker.clone(),
            fees: state.fees.clone(),
            last_rebalance: state.last_rebalance,
            total_yield_generated: state.total_yield_generated,
            total_assets_cache: state.total_assets_cache,
            performance: state.performance.clone(),
            created_at: state.created_at,
            taken_at,
        }
    }

    /// Rebuild a vault from a snapshot.
    ///
    /// Every active allocation needs its adapter in `adapters`; each is
    /// re-bound to the restored vault. Only `adapter_timeout_ms` is taken
    /// from `config`; everything else comes from the snapshot.
    pub async fn restore(
        snapshot: VaultSnapshot,
        config: &VaultConfig,
        adapters: Vec<Arc<dyn StrategyAdapter>>,
        clock: Arc<dyn Clock>,
    ) -> VaultResult<Self> {
        snapshot.verify()?;

        let mut bound = BTreeMap::new();
        for adapter in adapters {
            bound.insert(adapter.id(), adapter);
        }
        for allocation in snapshot.allocations.iter().filter(|a| a.active) {
            if !bound.contains_key(&allocation.strategy) {
                return Err(VaultError::StrategyNotFound { strategy: allocation.strategy });
            }
        }

        let state = VaultState {
            ledger: snapshot.ledger,
            idle: snapshot.idle,
            status: snapshot.status,
            allocations: snapshot.allocations,
            adapters: bound,
            breaker: snapshot.breaker,
            fees: snapshot.fees,
            last_rebalance: snapshot.last_rebalance,
            total_yield_generated: snapshot.total_yield_generated,
            total_assets_cache: snapshot.total_assets_cache,
            performance: snapshot.performance,
            events: EventLog::new(),
            created_at: snapshot.created_at,
        };
        let vault = Vault::from_parts(snapshot.identity, config.adapter_timeout(), clock, state);

        {
            let state = vault.state.read().await;
            for allocation in state.allocations.iter().filter(|a| a.active) {
                let adapter = state.adapter(&allocation.strategy)?;
                let bind = adapter.authorize_vault(vault.address());
                vault.call_adapter(allocation.strategy, "authorize_vault", bind).await?;
            }
        }

        info!(
            symbol = %vault.identity().symbol,
            taken_at = snapshot.taken_at,
            "vault restored from snapshot"
        );
        Ok(vault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yieldvault_common::access_control::AuthContext;
    use yieldvault_common::clock::ManualClock;

    async fn funded_vault() -> Vault {
        let clock = Arc::new(ManualClock::new(50));
        let vault = Vault::new(&VaultConfig::default(), [1u8; 32], [9u8; 32], clock).unwrap();
        vault.deposit(&AuthContext::user([2u8; 32]), 1_000, [2u8; 32]).await.unwrap();
        vault.deposit(&AuthContext::user([3u8; 32]), 500, [3u8; 32]).await.unwrap();
        vault
    }

    #[tokio::test]
    async fn test_encode_decode_restore() {
        let vault = funded_vault().await;
        let bytes = vault.snapshot().await.encode().unwrap();
        assert_eq!(&bytes[..4], b"YVS1");

        let decoded = VaultSnapshot::decode(&bytes).unwrap();
        let clock = Arc::new(ManualClock::new(60));
        let restored = Vault::restore(decoded, &VaultConfig::default(), Vec::new(), clock)
            .await
            .unwrap();

        assert_eq!(restored.address(), vault.address());
        assert_eq!(restored.balance_of(&[3u8; 32]).await, 500);
        assert_eq!(restored.total_assets().await.unwrap(), 1_500);
    }

    #[tokio::test]
    async fn test_corruption_detected() {
        let vault = funded_vault().await;
        let mut bytes = vault.snapshot().await.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(
            VaultSnapshot::decode(&bytes),
            Err(VaultError::InvalidSnapshot { reason: "checksum mismatch" })
        );
        assert!(VaultSnapshot::decode(&bytes[..10]).is_err());

        let mut bytes = vault.snapshot().await.encode().unwrap();
        bytes[0] = b'X';
        assert_eq!(
            VaultSnapshot::decode(&bytes),
            Err(VaultError::InvalidSnapshot { reason: "bad magic" })
        );
    }

    #[tokio::test]
    async fn test_missing_adapter_rejected() {
        let vault = funded_vault().await;
        let mut snapshot = vault.snapshot().await;
        snapshot.allocations.push(StrategyAllocation::new([7u8; 32], 5_000, 0));
        let clock = Arc::new(ManualClock::new(0));
        let err = Vault::restore(snapshot, &VaultConfig::default(), Vec::new(), clock)
            .await
            .err();
        assert_eq!(err, Some(VaultError::StrategyNotFound { strategy: [7u8; 32] }));
    }
}
