//! Application configuration structures.

use clawd_core::telemetry::TelemetryConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Shared store (Redis) connection.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Cache defaults.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Named rate-limiter presets, keyed by limiter name.
    ///
    /// Configured presets are merged over the built-in ones; a file that only
    /// adds `[rate_limits.calendar_api]` keeps `garmin_api` and friends.
    #[serde(
        default = "default_rate_limits",
        deserialize_with = "merge_rate_limits"
    )]
    pub rate_limits: BTreeMap<String, RateLimitConfig>,

    /// Job queue configuration.
    #[serde(default)]
    pub queues: QueuesConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppMetadata::default(),
            redis: RedisConfig::default(),
            cache: CacheConfig::default(),
            rate_limits: default_rate_limits(),
            queues: QueuesConfig::default(),
            observability: ObservabilityConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Looks up a named rate-limiter preset.
    #[must_use]
    pub fn rate_limit(&self, name: &str) -> Option<RateLimitConfig> {
        self.rate_limits.get(name).copied()
    }
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "clawd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Redis configuration.
///
/// Either `url` is set, or the connection URL is assembled from
/// `host`/`port`/`db`/`password`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Full connection URL; overrides the individual fields when present.
    pub url: Option<String>,
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
    /// Logical database index.
    pub db: u32,
    /// Optional password.
    pub password: Option<String>,
    /// Connection pool size.
    pub pool_size: usize,
    /// Timeout for establishing a connection, in seconds.
    pub connect_timeout_secs: u64,
    /// Timeout for waiting on a pooled connection or a reply, in seconds.
    pub response_timeout_secs: u64,
    /// Enable Redis (can be disabled for local development).
    pub enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "redis".to_string(),
            port: 6379,
            db: 0,
            password: None,
            pool_size: 10,
            connect_timeout_secs: 5,
            response_timeout_secs: 5,
            enabled: true,
        }
    }
}

impl RedisConfig {
    /// Returns the connection URL.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Returns the connection URL with any password masked, for logging.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***{}", &url[..scheme_end], &url[at..])
            }
            _ => url,
        }
    }

    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the response timeout as a Duration.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used when the caller does not pick one, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300, // 5 minutes
        }
    }
}

impl CacheConfig {
    /// Returns the default TTL as a Duration.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// A sliding-window rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions allowed per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    /// Creates a rate limit.
    #[must_use]
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Returns the window as a Duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_rate_limits() -> BTreeMap<String, RateLimitConfig> {
    BTreeMap::from([
        ("garmin_api".to_string(), RateLimitConfig::new(15, 60)),
        ("weather_api".to_string(), RateLimitConfig::new(60, 60)),
        ("github_api".to_string(), RateLimitConfig::new(30, 60)),
    ])
}

fn merge_rate_limits<'de, D>(deserializer: D) -> Result<BTreeMap<String, RateLimitConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<String, RateLimitConfig>::deserialize(deserializer)?;
    let mut limits = default_rate_limits();
    limits.extend(configured);
    Ok(limits)
}

/// Job queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    /// Queues known to operations tooling.
    pub names: Vec<String>,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            names: vec!["sync_tasks".to_string(), "notifications".to_string()],
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Install the Prometheus exporter in long-running processes.
    pub metrics_enabled: bool,
    /// Listen address for the Prometheus scrape endpoint.
    pub metrics_listen: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_listen: "0.0.0.0:9464".to_string(),
        }
    }
}
