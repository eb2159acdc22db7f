//! Wall-clock abstraction.
//!
//! Rate-limit windows and cache expiry are computed in whole milliseconds
//! since the Unix epoch. Components take an `Arc<dyn Clock>` so tests can
//! drive time explicitly with [`ManualClock`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<i64>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let by_ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        let mut now = self.now.lock();
        *now = now.saturating_add(by_ms);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, now_ms: i64) {
        *self.now.lock() = now_ms;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // 2026-01-26T00:00:00Z
        Self::new(1_769_385_600_000)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        *self.now.lock()
    }
}

/// The shared default clock.
#[must_use]
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
