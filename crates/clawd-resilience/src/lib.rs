//! # Clawd Resilience
//!
//! Admission control shared by every worker process.
//! Provides a sliding-window rate limiter kept in the shared store.

pub mod metrics;
pub mod rate_limiter;

pub use self::metrics::register_metrics;
pub use rate_limiter::*;
