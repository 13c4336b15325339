//! Time sources for caches, ledger timestamps and recency scoring.
//!
//! Components never call `Utc::now()` directly; they read the clock injected
//! through the worker context so tests can pin and fast-forward time.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time
pub trait Clock: Debug + Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Time only moves when `fast_forward` or `set_time_ms` is called.
#[derive(Debug)]
pub struct FakeClock {
    /// Current time in milliseconds since Unix epoch
    current_ms: AtomicI64,
}

impl FakeClock {
    /// Create a clock pinned at the given epoch milliseconds
    #[must_use]
    pub fn at_ms(time_ms: i64) -> Self {
        Self {
            current_ms: AtomicI64::new(time_ms),
        }
    }

    /// Create a clock pinned at the given instant
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self::at_ms(time.timestamp_millis())
    }

    /// Create a clock pinned at the current wall time
    #[must_use]
    pub fn starting_now() -> Self {
        Self::at(Utc::now())
    }

    /// Current fake time in milliseconds
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Set clock to a fixed time
    pub fn set_time_ms(&self, time_ms: i64) {
        self.current_ms.store(time_ms, Ordering::SeqCst);
    }

    /// Fast-forward time by duration
    pub fn fast_forward(&self, duration: Duration) {
        let delta = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.current_ms.fetch_add(delta, Ordering::SeqCst);
    }

    /// Fast-forward time by whole days
    pub fn fast_forward_days(&self, days: u64) {
        self.fast_forward(Duration::from_secs(days * 86_400));
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::at_ms(0)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }
}
