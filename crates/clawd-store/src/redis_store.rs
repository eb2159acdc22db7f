//! Redis backend.

use crate::backend::{StoreBackend, StoreStats, WindowState};
use async_trait::async_trait;
use clawd_config::RedisConfig;
use clawd_core::{ClawdError, ClawdResult};
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, InfoDict, Script};
use std::time::Duration;
use tracing::{debug, info};

/// Prune, count and conditionally record one admission in a single step.
const ADMIT_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)

if redis.call('ZCARD', key) < limit then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, ttl)
    return 1
end

return 0
";

/// Move one occurrence of a value from one list to the tail of another.
const RECLAIM_SCRIPT: &str = r"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) > 0 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end

return 0
";

/// Create a Redis connection pool.
///
/// No connection is opened here; the first command does that. A store that is
/// down at startup therefore surfaces as command errors, not as a failure to
/// construct the client.
pub fn create_pool(config: &RedisConfig) -> ClawdResult<Pool> {
    info!(url = %config.redacted_url(), "Creating Redis connection pool...");

    let cfg = Config::from_url(config.connection_url());

    let pool = cfg
        .builder()
        .map_err(|e| ClawdError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .wait_timeout(Some(config.response_timeout()))
        .create_timeout(Some(config.connect_timeout()))
        .recycle_timeout(Some(config.response_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| ClawdError::Configuration(format!("Failed to create pool: {}", e)))?;

    Ok(pool)
}

/// Redis-backed store.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    admit_script: Script,
    reclaim_script: Script,
}

impl RedisStore {
    /// Creates a store over an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            admit_script: Script::new(ADMIT_SCRIPT),
            reclaim_script: Script::new(RECLAIM_SCRIPT),
        }
    }

    /// Creates a store from configuration.
    pub fn from_config(config: &RedisConfig) -> ClawdResult<Self> {
        Ok(Self::new(create_pool(config)?))
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> ClawdResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("RedisStore")
            .field("max_size", &status.max_size)
            .field("size", &status.size)
            .field("available", &status.available)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn ping(&self) -> ClawdResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut *conn).await?;
        Ok(())
    }

    async fn stats(&self) -> ClawdResult<StoreStats> {
        let mut conn = self.conn().await?;
        let info: InfoDict = redis::cmd("INFO").query_async(&mut *conn).await?;

        Ok(StoreStats {
            connected_clients: info.get("connected_clients").unwrap_or(0),
            used_memory_human: info
                .get("used_memory_human")
                .unwrap_or_else(|| "N/A".to_string()),
            uptime_seconds: info.get("uptime_in_seconds").unwrap_or(0),
            total_commands_processed: info.get("total_commands_processed").unwrap_or(0),
        })
    }

    async fn get(&self, key: &str) -> ClawdResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> ClawdResult<()> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> ClawdResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn window_admit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
        member: &str,
        ttl_secs: u64,
    ) -> ClawdResult<bool> {
        let mut conn = self.conn().await?;
        let admitted: i64 = self
            .admit_script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .arg(ttl_secs.max(1))
            .invoke_async(&mut *conn)
            .await?;
        Ok(admitted == 1)
    }

    async fn window_state(&self, key: &str, now_ms: i64, window_ms: i64) -> ClawdResult<WindowState> {
        let mut conn = self.conn().await?;
        let (count, oldest): (u64, Vec<(String, f64)>) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(now_ms - window_ms)
            .ignore()
            .zcard(key)
            .cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut *conn)
            .await?;

        #[allow(clippy::cast_possible_truncation)]
        let oldest_ms = oldest.first().map(|(_, score)| *score as i64);

        Ok(WindowState { count, oldest_ms })
    }

    async fn list_push(&self, key: &str, value: &str) -> ClawdResult<()> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> ClawdResult<Option<String>> {
        let mut conn = self.conn().await?;

        if timeout.is_zero() {
            return Ok(redis::cmd("RPOPLPUSH")
                .arg(source)
                .arg(destination)
                .query_async(&mut *conn)
                .await?);
        }

        // BRPOPLPUSH takes whole seconds on older servers; round up so the
        // caller never waits less than asked.
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        debug!(source, secs, "Blocking list move");

        Ok(redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(destination)
            .arg(secs)
            .query_async(&mut *conn)
            .await?)
    }

    async fn list_remove(&self, key: &str, value: &str) -> ClawdResult<u64> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.lrem(key, 1, value).await?;
        Ok(removed)
    }

    async fn list_remove_and_push(
        &self,
        source: &str,
        value: &str,
        destination: &str,
        entry: &str,
    ) -> ClawdResult<u64> {
        let mut conn = self.conn().await?;
        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .lrem(source, 1, value)
            .lpush(destination, entry)
            .ignore()
            .query_async(&mut *conn)
            .await?;
        Ok(removed)
    }

    async fn list_reclaim(&self, source: &str, destination: &str, value: &str) -> ClawdResult<bool> {
        let mut conn = self.conn().await?;
        let moved: i64 = self
            .reclaim_script
            .key(source)
            .key(destination)
            .arg(value)
            .invoke_async(&mut *conn)
            .await?;
        Ok(moved == 1)
    }

    async fn list_len(&self, key: &str) -> ClawdResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(key).await?)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> ClawdResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut *conn)
            .await?)
    }
}
