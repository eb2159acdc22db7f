//! Rate limiter metrics.

use metrics::{counter, describe_counter};

/// Metric names for rate limiting.
pub mod names {
    /// Requests admitted.
    pub const RATELIMIT_ALLOWED_TOTAL: &str = "clawd_ratelimit_allowed_total";
    /// Requests turned away because the window was full.
    pub const RATELIMIT_DENIED_TOTAL: &str = "clawd_ratelimit_denied_total";
    /// Requests admitted because the store could not be consulted.
    pub const RATELIMIT_FAIL_OPEN_TOTAL: &str = "clawd_ratelimit_fail_open_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::RATELIMIT_ALLOWED_TOTAL,
        "Total number of requests admitted by a rate limiter"
    );
    describe_counter!(
        names::RATELIMIT_DENIED_TOTAL,
        "Total number of requests denied by a rate limiter"
    );
    describe_counter!(
        names::RATELIMIT_FAIL_OPEN_TOTAL,
        "Total number of requests admitted because the limiter store was unavailable"
    );
}

pub(crate) struct RateLimitMetrics;

impl RateLimitMetrics {
    pub(crate) fn allowed(limiter: &str) {
        counter!(names::RATELIMIT_ALLOWED_TOTAL, "limiter" => limiter.to_string()).increment(1);
    }

    pub(crate) fn denied(limiter: &str) {
        counter!(names::RATELIMIT_DENIED_TOTAL, "limiter" => limiter.to_string()).increment(1);
    }

    pub(crate) fn fail_open(limiter: &str) {
        counter!(names::RATELIMIT_FAIL_OPEN_TOTAL, "limiter" => limiter.to_string()).increment(1);
    }
}
