//! Time Source
//!
//! Every timestamp the vault and the strategies see comes from a [`Clock`].
//! Production uses wall time; tests and simulations drive a
//! [`ManualClock`] forward explicitly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of Unix timestamps (seconds)
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // Pre-epoch system time is clamped to zero
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Manually advanced clock.
///
/// Only moves forward: `set` to an earlier time is ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start` seconds
    pub fn new(start: u64) -> Self {
        Self { current: AtomicU64::new(start) }
    }

    /// Advance by `secs`
    pub fn advance(&self, secs: u64) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(secs)));
    }

    /// Jump to `timestamp` if it is not in the past
    pub fn set(&self, timestamp: u64) {
        self.current.fetch_max(timestamp, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
