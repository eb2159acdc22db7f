//! # Clawd Cache
//!
//! TTL cache of JSON values in the shared store, plus memoization of slow or
//! rate-limited calls.
//!
//! ```no_run
//! use clawd_cache::{cache_keys, CacheKey, CacheStore};
//! use clawd_store::StoreClient;
//! use std::time::Duration;
//!
//! # async fn example(client: StoreClient) {
//! let cache = CacheStore::new(client);
//! let key = CacheKey::new(cache_keys::WEATHER).arg("Berlin");
//! let forecast: serde_json::Value = cache
//!     .memoize(&key, Duration::from_secs(600), || async {
//!         serde_json::json!({"temp": 21})
//!     })
//!     .await;
//! # }
//! ```

pub mod cache_keys;
mod key;
pub mod metrics;
mod store;

pub use key::CacheKey;
pub use self::metrics::register_metrics;
pub use store::{CacheStore, DEFAULT_TTL};
