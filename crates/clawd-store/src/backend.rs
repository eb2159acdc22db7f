//! Store backend trait.
//!
//! A backend exposes the handful of primitive store operations the
//! coordination components are built from. The two operations that must be
//! indivisible across processes (`window_admit` and the list moves) are part
//! of the trait, so each backend decides how it guarantees atomicity.

use async_trait::async_trait;
use clawd_core::ClawdResult;
use serde::Serialize;
use std::time::Duration;

/// Snapshot of a sliding window after pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowState {
    /// Entries still inside the window.
    pub count: u64,
    /// Score (milliseconds) of the oldest entry inside the window.
    pub oldest_ms: Option<i64>,
}

/// Coarse server statistics reported by the health probe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    /// Number of connected clients.
    pub connected_clients: i64,
    /// Memory in use, human readable.
    pub used_memory_human: String,
    /// Server uptime in seconds.
    pub uptime_seconds: i64,
    /// Commands processed since start.
    pub total_commands_processed: i64,
}

/// Primitive operations against the shared store.
///
/// Errors are returned as-is; the components decide how to degrade.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Round trip to check reachability.
    async fn ping(&self) -> ClawdResult<()>;

    /// Server statistics.
    async fn stats(&self) -> ClawdResult<StoreStats>;

    /// Reads a string value.
    async fn get(&self, key: &str) -> ClawdResult<Option<String>>;

    /// Writes a string value that expires after `ttl_secs` (at least 1).
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> ClawdResult<()>;

    /// Deletes a key. Returns whether it existed.
    async fn del(&self, key: &str) -> ClawdResult<bool>;

    /// Atomically prunes entries with score `<= now_ms - window_ms`, and if
    /// fewer than `limit` remain, records `member` at score `now_ms` and
    /// refreshes the key TTL to `ttl_secs`.
    ///
    /// Returns whether the member was recorded.
    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
        member: &str,
        ttl_secs: u64,
    ) -> ClawdResult<bool>;

    /// Prunes expired entries and reports what is left.
    async fn window_state(&self, key: &str, now_ms: i64, window_ms: i64) -> ClawdResult<WindowState>;

    /// Prepends a value to a list.
    async fn list_push(&self, key: &str, value: &str) -> ClawdResult<()>;

    /// Atomically moves the tail of `source` to the head of `destination`.
    ///
    /// With a zero `timeout` this does not wait. Otherwise it waits up to
    /// `timeout` for `source` to become non-empty.
    async fn list_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> ClawdResult<Option<String>>;

    /// Removes one occurrence of `value`, searching from the head.
    ///
    /// Returns the number removed (0 or 1).
    async fn list_remove(&self, key: &str, value: &str) -> ClawdResult<u64>;

    /// Atomically removes one occurrence of `value` from `source` and
    /// prepends `entry` to `destination`. The entry is written even when
    /// `value` was not found.
    async fn list_remove_and_push(
        &self,
        source: &str,
        value: &str,
        destination: &str,
        entry: &str,
    ) -> ClawdResult<u64>;

    /// Atomically removes one occurrence of `value` from `source` and, only if
    /// it was found, appends it to the tail of `destination`.
    async fn list_reclaim(&self, source: &str, destination: &str, value: &str) -> ClawdResult<bool>;

    /// Length of a list.
    async fn list_len(&self, key: &str) -> ClawdResult<u64>;

    /// Elements between `start` and `stop` (inclusive, negative counts from the tail).
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> ClawdResult<Vec<String>>;
}
