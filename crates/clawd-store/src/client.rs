//! Store client handle and health probe.

use crate::backend::{StoreBackend, StoreStats, WindowState};
use crate::memory_store::MemoryStore;
use crate::redis_store::RedisStore;
use async_trait::async_trait;
use clawd_config::RedisConfig;
use clawd_core::{Clock, ClawdError, ClawdResult};
use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared handle to the store.
///
/// Built once by the process bootstrap and passed to every component.
/// Clones share the underlying backend (and its connection pool).
#[derive(Clone)]
pub struct StoreClient {
    backend: Arc<dyn StoreBackend>,
    kind: &'static str,
}

impl StoreClient {
    /// Connects to Redis as configured, or returns a disabled client when
    /// `redis.enabled` is false.
    ///
    /// Only configuration problems are errors. An unreachable store yields a
    /// client whose operations fail until the store comes back.
    pub fn connect(config: &RedisConfig) -> ClawdResult<Self> {
        if !config.enabled {
            info!("Redis disabled by configuration");
            return Ok(Self::disabled());
        }

        let store = RedisStore::from_config(config)?;
        info!(url = %config.redacted_url(), "Store client ready");
        Ok(Self::from_backend(Arc::new(store), "redis"))
    }

    /// In-process store on the system clock.
    #[must_use]
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()), "memory")
    }

    /// In-process store measuring expiry with `clock`.
    #[must_use]
    pub fn memory_with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_backend(Arc::new(MemoryStore::with_clock(clock)), "memory")
    }

    /// A client whose every operation fails as unavailable.
    #[must_use]
    pub fn disabled() -> Self {
        Self::from_backend(Arc::new(DisabledStore), "disabled")
    }

    /// Wraps an arbitrary backend.
    #[must_use]
    pub fn from_backend(backend: Arc<dyn StoreBackend>, kind: &'static str) -> Self {
        Self { backend, kind }
    }

    /// Backend name: `redis`, `memory`, `disabled` or a custom label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Check if the store answers a PING.
    pub async fn is_available(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(backend = self.kind, error = %e, "Store not available");
                false
            }
        }
    }

    /// Liveness probe with coarse server statistics. Never fails.
    pub async fn health_check(&self) -> StoreHealth {
        match self.backend.stats().await {
            Ok(stats) => StoreHealth::healthy(stats),
            Err(e) => {
                warn!(backend = self.kind, error = %e, "Store health check failed");
                StoreHealth::unhealthy(&e)
            }
        }
    }
}

impl Deref for StoreClient {
    type Target = dyn StoreBackend;

    fn deref(&self) -> &Self::Target {
        self.backend.as_ref()
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The store answered.
    Healthy,
    /// The store could not be reached or refused the probe.
    Unhealthy,
}

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    /// Overall status.
    pub status: HealthStatus,
    /// Connected clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<i64>,
    /// Memory in use, human readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory_human: Option<String>,
    /// Uptime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    /// Commands processed since start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_commands_processed: Option<i64>,
    /// Why the probe failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreHealth {
    fn healthy(stats: StoreStats) -> Self {
        Self {
            status: HealthStatus::Healthy,
            connected_clients: Some(stats.connected_clients),
            used_memory_human: Some(stats.used_memory_human),
            uptime_seconds: Some(stats.uptime_seconds),
            total_commands_processed: Some(stats.total_commands_processed),
            error: None,
        }
    }

    fn unhealthy(error: &ClawdError) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            connected_clients: None,
            used_memory_human: None,
            uptime_seconds: None,
            total_commands_processed: None,
            error: Some(error.to_string()),
        }
    }

    /// True when the store answered.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Backend used when the store is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

#[async_trait]
impl StoreBackend for DisabledStore {
    async fn ping(&self) -> ClawdResult<()> {
        Err(ClawdError::Disabled)
    }

    async fn stats(&self) -> ClawdResult<StoreStats> {
        Err(ClawdError::Disabled)
    }

    async fn get(&self, _key: &str) -> ClawdResult<Option<String>> {
        Err(ClawdError::Disabled)
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> ClawdResult<()> {
        Err(ClawdError::Disabled)
    }

    async fn del(&self, _key: &str) -> ClawdResult<bool> {
        Err(ClawdError::Disabled)
    }

    async fn window_admit(
        &self,
        _key: &str,
        _now_ms: i64,
        _window_ms: i64,
        _limit: u64,
        _member: &str,
        _ttl_secs: u64,
    ) -> ClawdResult<bool> {
        Err(ClawdError::Disabled)
    }

    async fn window_state(&self, _key: &str, _now_ms: i64, _window_ms: i64) -> ClawdResult<WindowState> {
        Err(ClawdError::Disabled)
    }

    async fn list_push(&self, _key: &str, _value: &str) -> ClawdResult<()> {
        Err(ClawdError::Disabled)
    }

    async fn list_move(
        &self,
        _source: &str,
        _destination: &str,
        _timeout: Duration,
    ) -> ClawdResult<Option<String>> {
        Err(ClawdError::Disabled)
    }

    async fn list_remove(&self, _key: &str, _value: &str) -> ClawdResult<u64> {
        Err(ClawdError::Disabled)
    }

    async fn list_remove_and_push(
        &self,
        _source: &str,
        _value: &str,
        _destination: &str,
        _entry: &str,
    ) -> ClawdResult<u64> {
        Err(ClawdError::Disabled)
    }

    async fn list_reclaim(&self, _source: &str, _destination: &str, _value: &str) -> ClawdResult<bool> {
        Err(ClawdError::Disabled)
    }

    async fn list_len(&self, _key: &str) -> ClawdResult<u64> {
        Err(ClawdError::Disabled)
    }

    async fn list_range(&self, _key: &str, _start: i64, _stop: i64) -> ClawdResult<Vec<String>> {
        Err(ClawdError::Disabled)
    }
}
