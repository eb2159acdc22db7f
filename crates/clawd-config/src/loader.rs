//! Configuration loader with layered sources.

use crate::AppConfig;
use clawd_core::ClawdError;
use config::{Config, ConfigError, Environment, File, Map};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Plain environment variables used by worker deployments. Each maps onto
/// the `redis` section (`REDIS_HOST` sets `redis.host`).
const LEGACY_REDIS_VARS: [&str; 4] = ["REDIS_HOST", "REDIS_PORT", "REDIS_DB", "REDIS_PASSWORD"];

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `{config_dir}/default.toml` - Default values
    /// 2. `{config_dir}/{environment}.toml` - Environment-specific overrides
    /// 3. `{config_dir}/local.toml` - Uncommitted local overrides
    /// 4. `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`, `REDIS_PASSWORD`
    /// 5. Environment variables with `CLAWD__` prefix (`CLAWD__REDIS__POOL_SIZE=4`)
    ///
    /// Later layers win, so `CLAWD__REDIS__HOST` beats `REDIS_HOST`.
    pub fn new(config_dir: impl Into<String>) -> Result<Self, ClawdError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, ClawdError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), ClawdError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, ClawdError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }
        Self::load_with_env(config_dir, None)
    }

    /// Loads configuration, reading environment layers from `env` instead of
    /// the process environment when given.
    fn load_with_env(
        config_dir: &str,
        env: Option<Map<String, String>>,
    ) -> Result<AppConfig, ClawdError> {

        let environment = match &env {
            Some(vars) => vars.get("CLAWD_ENVIRONMENT").cloned(),
            None => std::env::var("CLAWD_ENVIRONMENT").ok(),
        }
        .unwrap_or_else(|| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder
            .add_source(legacy_redis_env(env.as_ref()))
            .add_source(
                Environment::with_prefix("CLAWD")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            );

        let app_config: AppConfig = builder
            .set_override("app.environment", environment)
            .map_err(config_error_to_clawd_error)?
            .build()
            .map_err(config_error_to_clawd_error)?
            .try_deserialize()
            .map_err(config_error_to_clawd_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration.
    pub fn validate_config(config: &AppConfig) -> Result<(), ClawdError> {
        if config.redis.pool_size == 0 {
            return Err(ClawdError::configuration("redis.pool_size must be at least 1"));
        }

        for (name, limit) in &config.rate_limits {
            if limit.max_requests == 0 {
                return Err(ClawdError::configuration(format!(
                    "rate_limits.{name}.max_requests must be at least 1"
                )));
            }
            if limit.window_secs == 0 {
                return Err(ClawdError::configuration(format!(
                    "rate_limits.{name}.window_secs must be at least 1"
                )));
            }
        }

        if config.cache.default_ttl_secs == 0 {
            warn!("cache.default_ttl_secs is 0; entries will be written with a 1 second TTL");
        }

        if !config.redis.enabled {
            warn!("Redis is disabled; cache, rate limiting and queues will run degraded");
        }

        Ok(())
    }
}

/// `REDIS_*` variables as a source layered between the files and `CLAWD__*`.
fn legacy_redis_env(env: Option<&Map<String, String>>) -> Environment {
    let vars: Map<String, String> = LEGACY_REDIS_VARS
        .iter()
        .filter_map(|var| {
            let value = match env {
                Some(vars) => vars.get(*var).cloned(),
                None => std::env::var(var).ok(),
            };
            value.map(|value| (var.to_string(), value))
        })
        .collect();

    for var in vars.keys() {
        debug!("Applying {} override", var);
    }

    Environment::default()
        .separator("_")
        .ignore_empty(true)
        .source(Some(vars))
}

fn config_error_to_clawd_error(err: ConfigError) -> ClawdError {
    ClawdError::Configuration(err.to_string())
}
