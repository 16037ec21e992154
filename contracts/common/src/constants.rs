//! Vault Constants
//!
//! Bounds, defaults and unit conversions for the YieldVault core.
//! Runtime-tunable values (fees, breaker threshold, cooldowns) are validated
//! against the bounds declared here.

/// Basis point arithmetic
pub mod bps {
    /// Basis points denominator (100% = 10_000)
    pub const DENOMINATOR: u64 = 10_000;

    /// Full allocation of vault assets (100%)
    pub const MAX_TOTAL_ALLOCATION: u64 = DENOMINATOR;
}

/// Fee bounds and defaults (basis points)
pub mod fees {
    /// Maximum performance fee (20% of harvested yield)
    pub const MAX_PERFORMANCE_FEE_BPS: u64 = 2_000;

    /// Maximum management fee (2% of assets per year)
    pub const MAX_MANAGEMENT_FEE_BPS: u64 = 200;

    /// Default performance fee (10%)
    pub const DEFAULT_PERFORMANCE_FEE_BPS: u64 = 1_000;

    /// Default management fee (1%)
    pub const DEFAULT_MANAGEMENT_FEE_BPS: u64 = 100;

    /// Days used to spread the annual management fee into a daily charge
    pub const DAYS_PER_YEAR: u64 = 365;
}

/// Circuit breaker bounds and defaults
pub mod breaker {
    use super::time::{DAY, HOUR};

    /// Upper bound for the loss threshold (50%)
    pub const MAX_LOSS_THRESHOLD_BPS: u64 = 5_000;

    /// Default loss threshold (5%)
    pub const DEFAULT_LOSS_THRESHOLD_BPS: u64 = 500;

    /// Shortest allowed cooldown before a tripped breaker can be reset
    pub const MIN_COOLDOWN_SECS: u64 = HOUR;

    /// Longest allowed cooldown before a tripped breaker can be reset
    pub const MAX_COOLDOWN_SECS: u64 = 7 * DAY;

    /// Default cooldown (24 hours)
    pub const DEFAULT_COOLDOWN_SECS: u64 = DAY;
}

/// Allocation manager configuration
pub mod allocation {
    use super::time::HOUR;

    /// Minimum spacing between two rebalance cycles
    pub const REBALANCE_COOLDOWN_SECS: u64 = HOUR;

    /// Maximum number of allocation records (active and retired)
    pub const MAX_STRATEGIES: usize = 32;
}

/// Adapter call limits
pub mod adapter {
    /// Default timeout for a single strategy adapter call
    pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
}

/// Time-related constants (seconds)
pub mod time {
    /// Seconds per hour
    pub const HOUR: u64 = 3_600;

    /// Seconds per day
    pub const DAY: u64 = 24 * HOUR;

    /// Seconds per (365 day) year
    pub const YEAR: u64 = 365 * DAY;
}

/// Precision constants
pub mod precision {
    /// Fixed-point scale for share prices (assets per share * 1e18)
    pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;
}

/// Snapshot format
pub mod snapshot {
    /// Current snapshot encoding version
    pub const VERSION: u16 = 1;

    /// Magic prefix identifying a vault snapshot
    pub const MAGIC: [u8; 4] = *b"YVS1";
}
