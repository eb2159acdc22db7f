//! Process bootstrap.

use clawd_cache::CacheStore;
use clawd_config::{AppConfig, ConfigLoader, ObservabilityConfig};
use clawd_core::telemetry::init_telemetry;
use clawd_core::{ClawdError, ClawdResult};
use clawd_jobs::JobQueue;
use clawd_resilience::RateLimiter;
use clawd_store::{StoreClient, StoreHealth};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Owns the store client of a process and hands out components built on it.
///
/// A worker builds one coordinator at startup. Every cache, limiter and queue
/// it hands out shares the same connection pool.
#[derive(Clone)]
pub struct Coordinator {
    config: AppConfig,
    client: StoreClient,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("app", &self.config.app.name)
            .field("backend", &self.client.kind())
            .finish()
    }
}

impl Coordinator {
    /// Connects to the configured store.
    pub fn new(config: AppConfig) -> ClawdResult<Self> {
        let client = StoreClient::connect(&config.redis)?;
        Ok(Self::with_client(config, client))
    }

    /// Uses an existing client.
    #[must_use]
    pub fn with_client(config: AppConfig, client: StoreClient) -> Self {
        info!(
            app = %config.app.name,
            environment = %config.app.environment,
            backend = client.kind(),
            "Coordinator ready"
        );
        Self { config, client }
    }

    /// Loads configuration from `config_dir` and connects.
    pub async fn bootstrap(config_dir: &str) -> ClawdResult<Self> {
        let loader = ConfigLoader::new(config_dir)?;
        Self::new(loader.get().await)
    }

    /// Worker process startup: loads configuration, installs logging and the
    /// metrics exporter, then connects.
    pub async fn start(config_dir: &str) -> ClawdResult<Self> {
        let loader = ConfigLoader::new(config_dir)?;
        let config = loader.get().await;

        init_telemetry(&config.telemetry)?;
        info!(
            "Starting {} v{} ({})",
            config.app.name, config.app.version, config.app.environment
        );
        info!(redis = %config.redis.redacted_url(), "Store configured");

        install_metrics_exporter(&config.observability)?;
        Self::new(config)
    }

    /// Loaded configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The shared store client.
    #[must_use]
    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// Cache with the configured default TTL.
    #[must_use]
    pub fn cache(&self) -> CacheStore {
        CacheStore::from_config(self.client.clone(), &self.config.cache)
    }

    /// Rate limiter for a configured preset.
    pub fn rate_limiter(&self, name: &str) -> ClawdResult<RateLimiter> {
        RateLimiter::from_config(self.client.clone(), name, &self.config.rate_limits)
    }

    /// Job queue by name.
    #[must_use]
    pub fn queue(&self, name: &str) -> JobQueue {
        JobQueue::new(self.client.clone(), name)
    }

    /// The queues listed in configuration.
    #[must_use]
    pub fn queues(&self) -> Vec<JobQueue> {
        self.config
            .queues
            .names
            .iter()
            .map(|name| self.queue(name))
            .collect()
    }

    /// Store liveness probe.
    pub async fn health(&self) -> StoreHealth {
        self.client.health_check().await
    }
}

/// Register metric descriptions of every component.
pub fn register_metrics() {
    clawd_cache::register_metrics();
    clawd_resilience::register_metrics();
    clawd_jobs::register_metrics();
}

/// Installs the Prometheus exporter when metrics are enabled.
///
/// Must be called from within a Tokio runtime. Returns whether an exporter
/// was installed.
pub fn install_metrics_exporter(config: &ObservabilityConfig) -> ClawdResult<bool> {
    if !config.metrics_enabled {
        return Ok(false);
    }

    let addr: SocketAddr = config.metrics_listen.parse().map_err(|e| {
        ClawdError::configuration(format!(
            "Invalid metrics listen address '{}': {}",
            config.metrics_listen, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ClawdError::internal(format!("Failed to install metrics exporter: {e}")))?;

    register_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn coordinator() -> Coordinator {
        Coordinator::with_client(AppConfig::default(), StoreClient::memory())
    }

    #[tokio::test]
    async fn test_components_share_one_store() {
        let coordinator = coordinator();

        let producer = coordinator.queue("sync_tasks");
        let consumer = coordinator.queue("sync_tasks");
        assert!(producer.push(&json!({"task": "sync"})).await);
        assert!(consumer.pop(Duration::ZERO).await.is_some());

        let cache = coordinator.cache();
        assert_eq!(cache.default_ttl(), Duration::from_secs(300));
        assert!(cache.set("weather:Berlin", &json!({"temp": 3}), cache.default_ttl()).await);
        assert!(coordinator.cache().get::<serde_json::Value>("weather:Berlin").await.is_some());
    }

    #[tokio::test]
    async fn test_rate_limiter_presets() {
        let coordinator = coordinator();
        let limiter = coordinator.rate_limiter("garmin_api").unwrap();
        assert_eq!(limiter.max_requests(), 15);
        assert_eq!(limiter.remaining().await, 15);
        assert!(coordinator.rate_limiter("nope").is_err());
    }

    #[test]
    fn test_configured_queues() {
        let names: Vec<String> = coordinator()
            .queues()
            .iter()
            .map(|queue| queue.name().to_string())
            .collect();
        assert_eq!(names, vec!["sync_tasks", "notifications"]);
    }

    #[tokio::test]
    async fn test_disabled_store_bootstrap() {
        let mut config = AppConfig::default();
        config.redis.enabled = false;

        let coordinator = Coordinator::new(config).unwrap();
        assert_eq!(coordinator.client().kind(), "disabled");
        assert!(!coordinator.health().await.is_healthy());
    }

    #[test]
    fn test_metrics_exporter_disabled_by_default() {
        assert!(!install_metrics_exporter(&ObservabilityConfig::default()).unwrap());
    }

    #[test]
    fn test_metrics_exporter_rejects_bad_address() {
        let config = ObservabilityConfig {
            metrics_enabled: true,
            metrics_listen: "not-an-address".to_string(),
        };
        let err = install_metrics_exporter(&config).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
