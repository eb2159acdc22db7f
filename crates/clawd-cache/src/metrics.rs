//! Cache metrics.

use metrics::{counter, describe_counter};

/// Metric names for the cache.
pub mod names {
    /// Lookups that found a value.
    pub const CACHE_HITS_TOTAL: &str = "clawd_cache_hits_total";
    /// Lookups that found nothing (or could not read the store).
    pub const CACHE_MISSES_TOTAL: &str = "clawd_cache_misses_total";
    /// Store or encoding failures swallowed by the cache.
    pub const CACHE_ERRORS_TOTAL: &str = "clawd_cache_errors_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::CACHE_HITS_TOTAL, "Total number of cache hits");
    describe_counter!(names::CACHE_MISSES_TOTAL, "Total number of cache misses");
    describe_counter!(
        names::CACHE_ERRORS_TOTAL,
        "Total number of cache operations that failed and were ignored"
    );
}

/// Cache metrics recorder.
pub(crate) struct CacheMetrics;

impl CacheMetrics {
    pub(crate) fn hit(key: &str) {
        counter!(names::CACHE_HITS_TOTAL, "prefix" => prefix_label(key)).increment(1);
    }

    pub(crate) fn miss(key: &str) {
        counter!(names::CACHE_MISSES_TOTAL, "prefix" => prefix_label(key)).increment(1);
    }

    pub(crate) fn error(key: &str, operation: &'static str) {
        counter!(
            names::CACHE_ERRORS_TOTAL,
            "prefix" => prefix_label(key),
            "operation" => operation
        )
        .increment(1);
    }
}

/// First segment after `cache:`, so label cardinality stays bounded.
fn prefix_label(key: &str) -> String {
    let rest = key.strip_prefix("cache:").unwrap_or(key);
    rest.split(':').next().unwrap_or_default().to_string()
}
