//! Circuit Breaker Module
//!
//! Loss-driven halt for the vault.
//!
//! ## States
//!
//! - **Normal**: all operations allowed
//! - **Tripped**: every asset-mutating operation is rejected
//!
//! ## Transitions
//!
//! - Normal -> Tripped: explicit trigger by an authorized caller, or automatic
//!   when an operation measures `loss_bps >= threshold`
//! - Tripped -> Normal: `reset` once `now >= last_triggered_at + cooldown`,
//!   or `emergency_reset` at any time
//!
//! Parameter updates never change the current state.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::breaker::{
    DEFAULT_COOLDOWN_SECS, DEFAULT_LOSS_THRESHOLD_BPS, MAX_COOLDOWN_SECS, MAX_LOSS_THRESHOLD_BPS,
    MIN_COOLDOWN_SECS,
};
use crate::errors::{VaultError, VaultResult};
use crate::events::TriggerSource;
use crate::math::loss_bps;
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Kind of breaker transition
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum BreakerAction {
    Triggered,
    Reset,
    EmergencyReset,
}

/// Breaker transition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BreakerRecord {
    /// Transition performed
    pub action: BreakerAction,
    /// Caller responsible
    pub actor: Address,
    /// Loss that caused a trigger (0 for resets)
    pub loss_bps: u64,
    /// When it happened
    pub at: u64,
}

/// Circuit breaker state embedded in the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CircuitBreakerState {
    /// Loss that trips the breaker (basis points)
    pub loss_threshold_bps: u64,
    /// Seconds before a tripped breaker may be reset
    pub cooldown_secs: u64,
    /// Whether the breaker is tripped
    pub active: bool,
    /// Timestamp of the last trigger
    pub last_triggered_at: u64,
    /// Total number of triggers
    pub trigger_count: u64,
    /// Triggers per actor
    pub trigger_count_by_actor: BTreeMap<Address, u64>,
    /// Transition history
    pub history: Vec<BreakerRecord>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            loss_threshold_bps: DEFAULT_LOSS_THRESHOLD_BPS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            active: false,
            last_triggered_at: 0,
            trigger_count: 0,
            trigger_count_by_actor: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

impl CircuitBreakerState {
    /// Create breaker state with validated parameters
    pub fn new(loss_threshold_bps: u64, cooldown_secs: u64) -> VaultResult<Self> {
        validate_threshold(loss_threshold_bps)?;
        validate_cooldown(cooldown_secs)?;
        Ok(Self {
            loss_threshold_bps,
            cooldown_secs,
            ..Self::default()
        })
    }

    /// Whether a loss of `loss_bps` would trip the breaker now
    pub fn should_trigger(&self, loss_bps: u64) -> bool {
        loss_bps >= self.loss_threshold_bps && !self.active
    }

    /// Earliest timestamp at which a reset is allowed
    pub fn ready_at(&self) -> u64 {
        self.last_triggered_at.saturating_add(self.cooldown_secs)
    }

    /// Check if the breaker is tripped and still cooling down
    pub fn in_cooldown(&self, now: u64) -> bool {
        self.active && now < self.ready_at()
    }

    /// Fail with `Paused` while tripped
    pub fn ensure_normal(&self) -> VaultResult<()> {
        if self.active {
            Err(VaultError::Paused)
        } else {
            Ok(())
        }
    }

    fn trip(&mut self, actor: Address, loss_bps: u64, now: u64) {
        self.active = true;
        self.last_triggered_at = now;
        self.trigger_count = self.trigger_count.saturating_add(1);
        let count = self.trigger_count_by_actor.entry(actor).or_insert(0);
        *count = count.saturating_add(1);
        self.history.push(BreakerRecord {
            action: BreakerAction::Triggered,
            actor,
            loss_bps,
            at: now,
        });
    }
}

/// Outcome of a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerTrigger {
    /// Who or what tripped it
    pub source: TriggerSource,
    /// Measured loss
    pub loss_bps: u64,
    /// Threshold in force
    pub threshold_bps: u64,
    /// When it tripped
    pub triggered_at: u64,
}

// ============================================================================
// Core Functions
// ============================================================================

/// Validate a loss threshold: (0, 50%]
pub fn validate_threshold(loss_threshold_bps: u64) -> VaultResult<()> {
    if loss_threshold_bps == 0 || loss_threshold_bps > MAX_LOSS_THRESHOLD_BPS {
        return Err(VaultError::InvalidParameter {
            param: "loss_threshold_bps",
            value: loss_threshold_bps,
            min: 1,
            max: MAX_LOSS_THRESHOLD_BPS,
        });
    }
    Ok(())
}

/// Validate a cooldown: [1 hour, 7 days]
pub fn validate_cooldown(cooldown_secs: u64) -> VaultResult<()> {
    if !(MIN_COOLDOWN_SECS..=MAX_COOLDOWN_SECS).contains(&cooldown_secs) {
        return Err(VaultError::InvalidParameter {
            param: "cooldown_secs",
            value: cooldown_secs,
            min: MIN_COOLDOWN_SECS,
            max: MAX_COOLDOWN_SECS,
        });
    }
    Ok(())
}

/// Trip the breaker on behalf of an authorized caller
///
/// The reported loss must reach the threshold.
pub fn trigger_circuit_breaker(
    state: &mut CircuitBreakerState,
    actor: Address,
    reason: &str,
    loss_bps: u64,
    now: u64,
) -> VaultResult<BreakerTrigger> {
    if state.active {
        return Err(VaultError::BreakerAlreadyTripped);
    }
    if !state.should_trigger(loss_bps) {
        return Err(VaultError::LossBelowThreshold {
            loss_bps,
            threshold_bps: state.loss_threshold_bps,
        });
    }

    state.trip(actor, loss_bps, now);

    Ok(BreakerTrigger {
        source: TriggerSource::Manual { reason: reason.to_string() },
        loss_bps,
        threshold_bps: state.loss_threshold_bps,
        triggered_at: now,
    })
}

/// Compare asset observations taken around an operation and trip on loss
///
/// `expected` is the value the operation should have left behind;
/// `actual` is what was measured afterwards.
pub fn check_loss_circuit_breaker(
    state: &mut CircuitBreakerState,
    actor: Address,
    operation: &str,
    expected: u64,
    actual: u64,
    now: u64,
) -> Option<BreakerTrigger> {
    let loss = loss_bps(expected, actual)?;
    if !state.should_trigger(loss) {
        return None;
    }

    state.trip(actor, loss, now);

    Some(BreakerTrigger {
        source: TriggerSource::Automatic { operation: operation.to_string() },
        loss_bps: loss,
        threshold_bps: state.loss_threshold_bps,
        triggered_at: now,
    })
}

/// Reset a tripped breaker once the cooldown has elapsed
pub fn reset_circuit_breaker(
    state: &mut CircuitBreakerState,
    actor: Address,
    now: u64,
) -> VaultResult<()> {
    if !state.active {
        return Err(VaultError::BreakerNotTripped);
    }
    if now < state.ready_at() {
        return Err(VaultError::CooldownActive { ready_at: state.ready_at(), now });
    }

    state.active = false;
    state.history.push(BreakerRecord {
        action: BreakerAction::Reset,
        actor,
        loss_bps: 0,
        at: now,
    });
    Ok(())
}

/// Reset a tripped breaker ignoring the cooldown
///
/// Returns the cooldown seconds that were skipped.
pub fn emergency_reset_circuit_breaker(
    state: &mut CircuitBreakerState,
    actor: Address,
    now: u64,
) -> VaultResult<u64> {
    if !state.active {
        return Err(VaultError::BreakerNotTripped);
    }

    let skipped = state.ready_at().saturating_sub(now);
    state.active = false;
    state.history.push(BreakerRecord {
        action: BreakerAction::EmergencyReset,
        actor,
        loss_bps: 0,
        at: now,
    });
    Ok(skipped)
}

/// Update breaker parameters; `None` leaves a value unchanged
pub fn update_circuit_breaker_config(
    state: &mut CircuitBreakerState,
    loss_threshold_bps: Option<u64>,
    cooldown_secs: Option<u64>,
) -> VaultResult<()> {
    if let Some(threshold) = loss_threshold_bps {
        validate_threshold(threshold)?;
    }
    if let Some(cooldown) = cooldown_secs {
        validate_cooldown(cooldown)?;
    }
    if let Some(threshold) = loss_threshold_bps {
        state.loss_threshold_bps = threshold;
    }
    if let Some(cooldown) = cooldown_secs {
        state.cooldown_secs = cooldown;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
