//! Key namespacing.
//!
//! Every component writes under its own prefix so keys from the cache, the
//! rate limiters and the job queues can never collide.

/// Prefix for cache entries.
pub const CACHE_PREFIX: &str = "cache";

/// Prefix for rate-limit windows.
pub const RATE_LIMIT_PREFIX: &str = "ratelimit";

/// Prefix for job queues.
pub const QUEUE_PREFIX: &str = "queue";

/// Store key builder.
pub struct StoreKeys;

impl StoreKeys {
    /// Cache key. A key already under `cache:` is returned unchanged.
    #[must_use]
    pub fn cache(key: &str) -> String {
        match key.strip_prefix(CACHE_PREFIX) {
            Some(rest) if rest.starts_with(':') => key.to_string(),
            _ => format!("{}:{}", CACHE_PREFIX, key),
        }
    }

    /// Sliding window for a named limiter.
    #[must_use]
    pub fn rate_limit(name: &str) -> String {
        format!("{}:{}", RATE_LIMIT_PREFIX, name)
    }

    /// Pending list of a queue.
    #[must_use]
    pub fn queue(name: &str) -> String {
        format!("{}:{}", QUEUE_PREFIX, name)
    }

    /// Processing list of a queue.
    #[must_use]
    pub fn queue_processing(name: &str) -> String {
        format!("{}:{}:processing", QUEUE_PREFIX, name)
    }

    /// Failed list of a queue.
    #[must_use]
    pub fn queue_failed(name: &str) -> String {
        format!("{}:{}:failed", QUEUE_PREFIX, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_prefixing() {
        assert_eq!(StoreKeys::cache("weather:Berlin"), "cache:weather:Berlin");
        assert_eq!(StoreKeys::cache("cache:weather:Berlin"), "cache:weather:Berlin");
        assert_eq!(StoreKeys::cache("cachey"), "cache:cachey");
    }

    #[test]
    fn test_component_keys() {
        assert_eq!(StoreKeys::rate_limit("garmin_api"), "ratelimit:garmin_api");
        assert_eq!(StoreKeys::queue("sync_tasks"), "queue:sync_tasks");
        assert_eq!(StoreKeys::queue_processing("sync_tasks"), "queue:sync_tasks:processing");
        assert_eq!(StoreKeys::queue_failed("sync_tasks"), "queue:sync_tasks:failed");
    }
}
