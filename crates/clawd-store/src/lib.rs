//! # Clawd Store
//!
//! Connection to the shared key-value store used by every worker process.
//!
//! The [`StoreClient`] is constructed once at startup and cloned into each
//! component. It dispatches to a [`StoreBackend`]:
//!
//! - [`RedisStore`]: the production backend (deadpool-redis pool, Lua scripts
//!   and MULTI/EXEC for the operations that must be atomic)
//! - [`MemoryStore`]: an in-process backend with the same semantics
//! - [`DisabledStore`]: every call fails as unavailable
//!
//! Keys are namespaced per component through [`StoreKeys`].

mod backend;
mod client;
mod keys;
mod memory_store;
mod redis_store;

pub use backend::{StoreBackend, StoreStats, WindowState};
#[cfg(any(test, feature = "mock"))]
pub use backend::MockStoreBackend;
pub use client::{DisabledStore, HealthStatus, StoreClient, StoreHealth};
pub use keys::{StoreKeys, CACHE_PREFIX, QUEUE_PREFIX, RATE_LIMIT_PREFIX};
pub use memory_store::MemoryStore;
pub use redis_store::{create_pool, RedisStore};
