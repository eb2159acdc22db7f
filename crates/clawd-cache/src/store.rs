//! JSON cache with TTL on top of the shared store.

use crate::key::CacheKey;
use crate::metrics::CacheMetrics;
use clawd_config::CacheConfig;
use clawd_store::{StoreClient, StoreKeys};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Default TTL for cached items (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache of JSON values with a TTL.
///
/// Caching is an optimization, never a dependency: every store or decoding
/// failure is logged and turned into a miss (for reads) or `false` (for
/// writes). Memoized computations always run when the cached value cannot be
/// used.
#[derive(Debug, Clone)]
pub struct CacheStore {
    client: StoreClient,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create a cache with the default TTL.
    #[must_use]
    pub fn new(client: StoreClient) -> Self {
        Self::with_ttl(client, DEFAULT_TTL)
    }

    /// Create a cache with a custom default TTL.
    #[must_use]
    pub fn with_ttl(client: StoreClient, default_ttl: Duration) -> Self {
        Self {
            client,
            default_ttl,
        }
    }

    /// Create a cache using the configured default TTL.
    #[must_use]
    pub fn from_config(client: StoreClient, config: &CacheConfig) -> Self {
        Self::with_ttl(client, config.default_ttl())
    }

    /// TTL used by [`CacheStore::set_default`].
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Reads and decodes a value.
    ///
    /// Returns `None` when the key is absent or expired, when the store is
    /// unreachable and when the stored text does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = StoreKeys::cache(key);

        let raw = match self.client.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                CacheMetrics::miss(&key);
                return None;
            }
            Err(e) => {
                error!(key = %key, error = %e, "Cache get error");
                CacheMetrics::error(&key, "get");
                CacheMetrics::miss(&key);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                CacheMetrics::hit(&key);
                Some(value)
            }
            Err(e) => {
                error!(key = %key, error = %e, "Cache entry could not be decoded");
                CacheMetrics::error(&key, "decode");
                CacheMetrics::miss(&key);
                None
            }
        }
    }

    /// Encodes and stores a value with a TTL.
    ///
    /// TTLs under one second are rounded up to one second.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let key = StoreKeys::cache(key);

        match serde_json::to_string(value) {
            Ok(data) => self.write(&key, &data, ttl).await,
            Err(e) => {
                error!(key = %key, error = %e, "Cache value could not be encoded");
                CacheMetrics::error(&key, "encode");
                false
            }
        }
    }

    /// Stores a value with the default TTL.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.set(key, value, self.default_ttl).await
    }

    /// Removes a key. Removing an absent key succeeds.
    pub async fn delete(&self, key: &str) -> bool {
        let key = StoreKeys::cache(key);

        match self.client.del(&key).await {
            Ok(existed) => {
                debug!(key = %key, existed, "Cache delete");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "Cache delete error");
                CacheMetrics::error(&key, "delete");
                false
            }
        }
    }

    /// Returns the cached value under `key`, or computes, caches and returns it.
    ///
    /// Empty results (`None`, `null`, `""`, `[]`, `{}`) are returned but not
    /// cached.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await {
            return cached;
        }

        let result = compute().await;
        self.store_result(key, &result, ttl).await;
        result
    }

    /// Memoizes an asynchronous computation under a derived key.
    pub async fn memoize<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.get_or_set(&key.build(), ttl, compute).await
    }

    /// Memoizes a synchronous computation under a derived key.
    ///
    /// Caching behaves exactly as in [`CacheStore::memoize`].
    pub async fn memoize_sync<T, F>(&self, key: &CacheKey, ttl: Duration, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.memoize(key, ttl, || std::future::ready(compute())).await
    }

    /// Memoizes a fallible computation. Errors are returned and never cached.
    pub async fn try_memoize<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = key.build();
        if let Some(cached) = self.get(&key).await {
            return Ok(cached);
        }

        let result = compute().await?;
        self.store_result(&key, &result, ttl).await;
        Ok(result)
    }

    async fn store_result<T: Serialize>(&self, key: &str, result: &T, ttl: Duration) {
        let key = StoreKeys::cache(key);

        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                error!(key = %key, error = %e, "Cache value could not be encoded");
                CacheMetrics::error(&key, "encode");
                return;
            }
        };

        if is_empty(&value) {
            debug!(key = %key, "Empty result, not caching");
            return;
        }

        if self.write(&key, &value.to_string(), ttl).await {
            debug!(key = %key, "Cache set");
        }
    }

    async fn write(&self, key: &str, data: &str, ttl: Duration) -> bool {
        let ttl_secs = ttl.as_secs().max(1);

        match self.client.set_ex(key, data, ttl_secs).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs, "Cached key");
                true
            }
            Err(e) => {
                error!(key = %key, error = %e, "Cache set error");
                CacheMetrics::error(key, "set");
                false
            }
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
