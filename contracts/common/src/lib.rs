//! YieldVault Common Library
//!
//! Shared types, constants and pure state machines for the YieldVault
//! core: share accounting, exchange-rate math, the loss circuit breaker and
//! the fee engine. Nothing in this crate performs I/O; the async vault and
//! the strategy adapters build on top of it.
//!
//! ## Modules
//!
//! - **Share Ledger**: balances, allowances and the share supply invariant
//! - **Math**: checked share <-> asset conversion with explicit rounding
//! - **Circuit Breaker**: loss-triggered halt with time-locked recovery
//! - **Fee Engine**: performance and management fees
//! - **Access Control**: role-based permissions via `AuthContext`
//! - **Events**: typed vault events for indexers and monitoring

pub mod clock;
pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod validation;
pub mod access_control;
pub mod circuit_breaker;
pub mod fees;

pub use clock::{Clock, ManualClock, SystemClock};
pub use access_control::{AuthContext, Permission, Role};
pub use circuit_breaker::{BreakerAction, BreakerRecord, BreakerTrigger, CircuitBreakerState};
pub use errors::{AmountErrorReason, VaultError, VaultResult};
pub use events::{EventLog, EventType, FeeKind, TriggerSource, VaultEvent};
pub use fees::FeeLedger;
pub use math::Rounding;
pub use types::*;
