//! Sliding-window rate limiter.

use crate::metrics::RateLimitMetrics;
use clawd_config::RateLimitConfig;
use clawd_core::{system_clock, Clock, ClawdError};
use clawd_store::{StoreClient, StoreKeys};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Smallest pause between admission attempts in [`RateLimiter::acquire`].
const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Rate limiter shared by every process that uses the same name.
///
/// Admits at most `max_requests` per rolling `window`. Admitted requests are
/// kept as timestamped members of `ratelimit:<name>`; the check and the
/// increment happen in one atomic step on the store.
///
/// When the store cannot be reached the limiter fails open: `allow` returns
/// `true`, `remaining` reports the full quota and `wait_time` is zero.
#[derive(Clone)]
pub struct RateLimiter {
    client: StoreClient,
    name: String,
    key: String,
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter for `name` admitting `max_requests` per `window_secs`.
    pub fn new(client: StoreClient, name: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        let name = name.into();
        Self {
            key: StoreKeys::rate_limit(&name),
            client,
            name,
            max_requests,
            window: Duration::from_secs(window_secs),
            clock: system_clock(),
        }
    }

    /// Creates a limiter from a named preset.
    pub fn from_config(
        client: StoreClient,
        name: &str,
        limits: &BTreeMap<String, RateLimitConfig>,
    ) -> Result<Self, ClawdError> {
        let limit = limits.get(name).ok_or_else(|| {
            ClawdError::configuration(format!("No rate limit configured for '{name}'"))
        })?;
        Ok(Self::new(client, name, limit.max_requests, limit.window_secs))
    }

    /// Uses `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Limiter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admissions allowed per window.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }

    /// Checks if a request is allowed, and records it if so.
    pub async fn allow(&self) -> bool {
        let now = self.clock.now_ms();
        let member = format!("{}-{}", now, Uuid::new_v4().simple());

        let result = self
            .client
            .window_admit(
                &self.key,
                now,
                self.window_ms(),
                u64::from(self.max_requests),
                &member,
                self.window.as_secs(),
            )
            .await;

        match result {
            Ok(true) => {
                debug!(limiter = %self.name, "Request allowed");
                RateLimitMetrics::allowed(&self.name);
                true
            }
            Ok(false) => {
                debug!(limiter = %self.name, max_requests = self.max_requests, "Rate limit reached");
                RateLimitMetrics::denied(&self.name);
                false
            }
            Err(e) => {
                warn!(limiter = %self.name, error = %e, "Rate limiter error, allowing request");
                RateLimitMetrics::fail_open(&self.name);
                true
            }
        }
    }

    /// Requests still available in the current window.
    pub async fn remaining(&self) -> u32 {
        let now = self.clock.now_ms();
        match self.client.window_state(&self.key, now, self.window_ms()).await {
            Ok(state) => {
                let used = u32::try_from(state.count).unwrap_or(u32::MAX);
                self.max_requests.saturating_sub(used)
            }
            Err(e) => {
                warn!(limiter = %self.name, error = %e, "Rate limiter error, reporting full quota");
                self.max_requests
            }
        }
    }

    /// Time until the next request would be allowed.
    ///
    /// Zero while the window has room. Otherwise, the time until the oldest
    /// admission leaves the window.
    pub async fn wait_time(&self) -> Duration {
        let now = self.clock.now_ms();
        let window_ms = self.window_ms();

        let state = match self.client.window_state(&self.key, now, window_ms).await {
            Ok(state) => state,
            Err(e) => {
                warn!(limiter = %self.name, error = %e, "Rate limiter error, reporting no wait");
                return Duration::ZERO;
            }
        };

        if state.count < u64::from(self.max_requests) {
            return Duration::ZERO;
        }

        state.oldest_ms.map_or(Duration::ZERO, |oldest| {
            let wait_ms = (oldest + window_ms - now).max(0);
            Duration::from_millis(u64::try_from(wait_ms).unwrap_or(0))
        })
    }

    /// Waits for admission, giving up after `max_wait`.
    ///
    /// Returns whether the request was admitted.
    pub async fn acquire(&self, max_wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            if self.allow().await {
                return true;
            }

            let delay = self.wait_time().await.max(MIN_RETRY_DELAY);
            let now = tokio::time::Instant::now();
            if now + delay > deadline {
                debug!(limiter = %self.name, ?max_wait, "Gave up waiting for rate limit");
                return false;
            }

            debug!(limiter = %self.name, ?delay, "Waiting for rate limit");
            tokio::time::sleep(delay).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawd_core::ManualClock;
    use clawd_store::{MockStoreBackend, WindowState};

    fn limiter(name: &str, max_requests: u32, window_secs: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        let client = StoreClient::memory_with_clock(Arc::new(clock.clone()));
        let limiter =
            RateLimiter::new(client, name, max_requests, window_secs).with_clock(Arc::new(clock.clone()));
        (limiter, clock)
    }

    fn unreachable() -> StoreClient {
        let mut backend = MockStoreBackend::new();
        backend
            .expect_window_admit()
            .returning(|_, _, _, _, _, _| Err(ClawdError::Connection("connection refused".to_string())));
        backend
            .expect_window_state()
            .returning(|_, _, _| Err(ClawdError::Timeout("5s".to_string())));
        StoreClient::from_backend(Arc::new(backend), "mock")
    }

    #[tokio::test]
    async fn test_admits_up_to_limit_then_recovers() {
        let (limiter, clock) = limiter("garmin_api", 5, 60);

        for _ in 0..5 {
            assert!(limiter.allow().await);
        }
        assert!(!limiter.allow().await);

        clock.advance(Duration::from_secs(61));
        assert!(limiter.allow().await);
    }

    #[tokio::test]
    async fn test_admission_control_scenario() {
        let (limiter, clock) = limiter("api", 2, 60);

        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
        assert_eq!(limiter.remaining().await, 0);

        clock.advance(Duration::from_secs(61));
        assert!(limiter.allow().await);
        assert_eq!(limiter.remaining().await, 1);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let (limiter, clock) = limiter("weather_api", 2, 60);

        assert!(limiter.allow().await);
        clock.advance(Duration::from_secs(30));
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);

        // The first admission leaves the window; the second is still inside.
        clock.advance(Duration::from_secs(31));
        assert_eq!(limiter.remaining().await, 1);
        assert!(limiter.allow().await);
        assert!(!limiter.allow().await);
    }

    #[tokio::test]
    async fn test_same_millisecond_admissions_do_not_merge() {
        let (limiter, _) = limiter("burst", 3, 60);

        for _ in 0..3 {
            assert!(limiter.allow().await);
        }
        assert_eq!(limiter.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_allow_admits_exactly_limit() {
        let (limiter, _) = limiter("contended", 10, 60);

        let attempts = (0..20).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.allow().await })
        });
        let results = futures::future::join_all(attempts).await;

        let admitted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_limiters_are_independent() {
        let clock = ManualClock::default();
        let client = StoreClient::memory_with_clock(Arc::new(clock.clone()));
        let github = RateLimiter::new(client.clone(), "github_api", 1, 60).with_clock(Arc::new(clock.clone()));
        let weather = RateLimiter::new(client, "weather_api", 1, 60).with_clock(Arc::new(clock));

        assert!(github.allow().await);
        assert!(!github.allow().await);
        assert!(weather.allow().await);
    }

    #[tokio::test]
    async fn test_wait_time() {
        let (limiter, clock) = limiter("api", 2, 60);
        assert_eq!(limiter.wait_time().await, Duration::ZERO);

        limiter.allow().await;
        clock.advance(Duration::from_secs(10));
        limiter.allow().await;
        assert_eq!(limiter.wait_time().await, Duration::from_secs(50));

        clock.advance(Duration::from_secs(20));
        assert_eq!(limiter.wait_time().await, Duration::from_secs(30));

        clock.advance(Duration::from_secs(31));
        assert_eq!(limiter.wait_time().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_remaining_is_clamped() {
        let (limiter, _) = limiter("shared", 3, 60);
        for _ in 0..3 {
            limiter.allow().await;
        }

        // A limiter with a smaller quota over the same window.
        let smaller = RateLimiter::new(limiter.client.clone(), "shared", 1, 60)
            .with_clock(Arc::clone(&limiter.clock));
        assert_eq!(smaller.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_is_down() {
        let limiter = RateLimiter::new(unreachable(), "garmin_api", 1, 60);

        assert!(limiter.allow().await);
        assert!(limiter.allow().await);
        assert_eq!(limiter.remaining().await, 1);
        assert_eq!(limiter.wait_time().await, Duration::ZERO);
        assert!(limiter.acquire(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn test_disabled_store_fails_open() {
        let limiter = RateLimiter::new(StoreClient::disabled(), "github_api", 1, 60);
        assert!(limiter.allow().await);
        assert_eq!(limiter.remaining().await, 1);
    }

    #[tokio::test]
    async fn test_wait_time_uses_oldest_entry() {
        let now = ManualClock::default();
        let start = now.now_ms();
        let mut backend = MockStoreBackend::new();
        backend.expect_window_state().returning(move |_, _, _| {
            Ok(WindowState {
                count: 2,
                oldest_ms: Some(start - 45_000),
            })
        });
        let limiter = RateLimiter::new(StoreClient::from_backend(Arc::new(backend), "mock"), "api", 2, 60)
            .with_clock(Arc::new(now));

        assert_eq!(limiter.wait_time().await, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_acquire_gives_up_after_max_wait() {
        let (limiter, _) = limiter("slow_api", 1, 60);
        assert!(limiter.acquire(Duration::from_millis(50)).await);
        assert!(!limiter.acquire(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::new(StoreClient::memory(), "fast_api", 1, 1);
        assert!(limiter.allow().await);

        let started = std::time::Instant::now();
        assert!(limiter.acquire(Duration::from_secs(3)).await);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn test_from_config() {
        let limits = BTreeMap::from([("garmin_api".to_string(), RateLimitConfig::new(15, 60))]);

        let limiter = RateLimiter::from_config(StoreClient::memory(), "garmin_api", &limits).unwrap();
        assert_eq!(limiter.name(), "garmin_api");
        assert_eq!(limiter.max_requests(), 15);
        assert_eq!(limiter.window(), Duration::from_secs(60));

        let err = RateLimiter::from_config(StoreClient::memory(), "unknown", &limits).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
