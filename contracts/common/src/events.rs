//! Vault Events
//!
//! Events are recorded during each operation and drained by indexers,
//! API layers and monitoring. Every event carries the timestamp of the
//! operation that produced it.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{Address, StrategyId, VaultStatus};

/// Event types for indexing and filtering
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Ledger Events (0x01 - 0x1F)
    Deposit = 0x01,
    Withdraw = 0x02,
    Approval = 0x03,

    // Allocation Events (0x20 - 0x3F)
    StrategyAdded = 0x20,
    StrategyRemoved = 0x21,
    AllocationUpdated = 0x22,
    Rebalanced = 0x23,
    YieldHarvested = 0x24,
    StrategyFailed = 0x25,

    // Fee Events (0x40 - 0x5F)
    FeesCollected = 0x40,
    FeeParametersUpdated = 0x41,

    // Circuit Breaker Events (0x60 - 0x7F)
    CircuitBreakerTriggered = 0x60,
    CircuitBreakerReset = 0x61,
    CircuitBreakerEmergencyReset = 0x62,
    BreakerParametersUpdated = 0x63,

    // Lifecycle Events (0x80 - 0x9F)
    StatusChanged = 0x80,
    EmergencyWithdraw = 0x81,
}

/// What triggered the breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum TriggerSource {
    /// An operation measured a loss at or above the threshold
    Automatic { operation: String },
    /// An authorized caller tripped the breaker
    Manual { reason: String },
}

/// Which fee was paid
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum FeeKind {
    Performance,
    Management,
}

/// Main event enum containing all vault events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum VaultEvent {
    // ============ Ledger Events ============

    /// Assets deposited and shares minted
    Deposit {
        caller: Address,
        receiver: Address,
        assets: u64,
        shares: u64,
        timestamp: u64,
    },

    /// Shares burned and assets paid out
    Withdraw {
        caller: Address,
        receiver: Address,
        owner: Address,
        assets: u64,
        shares: u64,
        timestamp: u64,
    },

    /// Allowance set
    Approval {
        owner: Address,
        spender: Address,
        shares: u64,
        timestamp: u64,
    },

    // ============ Allocation Events ============

    StrategyAdded {
        strategy: StrategyId,
        target_bps: u64,
        timestamp: u64,
    },

    /// Strategy retired; `recovered` is what came back from withdraw_all
    StrategyRemoved {
        strategy: StrategyId,
        recovered: u64,
        timestamp: u64,
    },

    AllocationUpdated {
        strategy: StrategyId,
        old_bps: u64,
        new_bps: u64,
        timestamp: u64,
    },

    /// Rebalance cycle finished
    Rebalanced {
        total_assets: u64,
        succeeded: u32,
        failed: u32,
        timestamp: u64,
    },

    /// Harvest cycle produced yield
    YieldHarvested {
        harvested: u64,
        performance_fee: u64,
        succeeded: u32,
        failed: u32,
        timestamp: u64,
    },

    /// A strategy call failed inside a batch operation
    StrategyFailed {
        strategy: StrategyId,
        operation: String,
        reason: String,
        timestamp: u64,
    },

    // ============ Fee Events ============

    FeesCollected {
        kind: FeeKind,
        amount: u64,
        recipient: Address,
        timestamp: u64,
    },

    FeeParametersUpdated {
        performance_fee_bps: u64,
        management_fee_bps: u64,
        recipient: Address,
        timestamp: u64,
    },

    // ============ Circuit Breaker Events ============

    CircuitBreakerTriggered {
        actor: Address,
        source: TriggerSource,
        loss_bps: u64,
        timestamp: u64,
    },

    /// Reset after cooldown expiry
    CircuitBreakerReset {
        actor: Address,
        timestamp: u64,
    },

    /// Privileged reset that bypassed the cooldown
    CircuitBreakerEmergencyReset {
        actor: Address,
        remaining_cooldown: u64,
        timestamp: u64,
    },

    BreakerParametersUpdated {
        loss_threshold_bps: u64,
        cooldown_secs: u64,
        timestamp: u64,
    },

    // ============ Lifecycle Events ============

    StatusChanged {
        actor: Address,
        old_status: VaultStatus,
        new_status: VaultStatus,
        timestamp: u64,
    },

    EmergencyWithdraw {
        actor: Address,
        recovered: u64,
        failed: u32,
        timestamp: u64,
    },
}

impl VaultEvent {
    /// Get the event type
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::Approval { .. } => EventType::Approval,
            Self::StrategyAdded { .. } => EventType::StrategyAdded,
            Self::StrategyRemoved { .. } => EventType::StrategyRemoved,
            Self::AllocationUpdated { .. } => EventType::AllocationUpdated,
            Self::Rebalanced { .. } => EventType::Rebalanced,
            Self::YieldHarvested { .. } => EventType::YieldHarvested,
            Self::StrategyFailed { .. } => EventType::StrategyFailed,
            Self::FeesCollected { .. } => EventType::FeesCollected,
            Self::FeeParametersUpdated { .. } => EventType::FeeParametersUpdated,
            Self::CircuitBreakerTriggered { .. } => EventType::CircuitBreakerTriggered,
            Self::CircuitBreakerReset { .. } => EventType::CircuitBreakerReset,
            Self::CircuitBreakerEmergencyReset { .. } => EventType::CircuitBreakerEmergencyReset,
            Self::BreakerParametersUpdated { .. } => EventType::BreakerParametersUpdated,
            Self::StatusChanged { .. } => EventType::StatusChanged,
            Self::EmergencyWithdraw { .. } => EventType::EmergencyWithdraw,
        }
    }

    /// Get the timestamp of the operation that emitted the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Deposit { timestamp, .. }
            | Self::Withdraw { timestamp, .. }
            | Self::Approval { timestamp, .. }
            | Self::StrategyAdded { timestamp, .. }
            | Self::StrategyRemoved { timestamp, .. }
            | Self::AllocationUpdated { timestamp, .. }
            | Self::Rebalanced { timestamp, .. }
            | Self::YieldHarvested { timestamp, .. }
            | Self::StrategyFailed { timestamp, .. }
            | Self::FeesCollected { timestamp, .. }
            | Self::FeeParametersUpdated { timestamp, .. }
            | Self::CircuitBreakerTriggered { timestamp, .. }
            | Self::CircuitBreakerReset { timestamp, .. }
            | Self::CircuitBreakerEmergencyReset { timestamp, .. }
            | Self::BreakerParametersUpdated { timestamp, .. }
            | Self::StatusChanged { timestamp, .. }
            | Self::EmergencyWithdraw { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events between drains
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<VaultEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: VaultEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&VaultEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Discard events emitted after `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if no events were emitted
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
