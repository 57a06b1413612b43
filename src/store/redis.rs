//! `RedisStore` - distributed store backend
//!
//! Redis-based [`CacheStore`] implementation using `ConnectionManager` for
//! automatic reconnection. The two lock operations run as server-side Lua
//! scripts so that check-and-set and check-and-delete are atomic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

use super::CacheStore;

/// Atomic set-if-absent plus expiry. Returns 1 iff the SETNX won; the
/// expiry result is deliberately not consulted — once SETNX succeeds the
/// lock is held, and the expiry is only a safety net against crashed
/// holders.
static ACQUIRE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        "if redis.call('setnx', KEYS[1], ARGV[1]) == 1 then \
             redis.call('expire', KEYS[1], ARGV[2]) \
             return 1 \
         else \
             return 0 \
         end",
    )
});

/// Atomic check-and-delete. Deletes the key only while it still holds the
/// caller's owner value, so a holder whose lock expired cannot delete a
/// lock re-acquired by someone else.
static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        "if redis.call('get', KEYS[1]) == ARGV[1] then \
             return redis.call('del', KEYS[1]) \
         else \
             return 0 \
         end",
    )
});

/// Redis-backed [`CacheStore`] with automatic reconnection.
pub struct RedisStore {
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect using the `REDIS_URL` environment variable, defaulting to
    /// `redis://127.0.0.1:6379`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the connection
    /// health check fails.
    pub async fn connect_from_env() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::connect(&redis_url).await
    }

    /// Connect to the given Redis URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or the connection
    /// health check fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!(redis_url = %redis_url, "connecting Redis store (ConnectionManager enabled)");

        let client = Client::open(redis_url)
            .with_context(|| format!("failed to create Redis client for {redis_url}"))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .context("failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Redis store connected");
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        // Option<String> keeps the nil/empty-string distinction the negative
        // marker depends on.
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("GET {key} failed"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set(key, value)
            .await
            .with_context(|| format!("SET {key} failed"))?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .with_context(|| format!("SETEX {key} failed"))?;
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[redis] stored key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(key)
            .await
            .with_context(|| format!("DEL {key} failed"))?;
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, owner: &str, expiry: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let granted: i64 = ACQUIRE_SCRIPT
            .key(key)
            .arg(owner)
            .arg(expiry.as_secs())
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("lock acquire script failed for {key}"))?;
        debug!(key = %key, granted = granted == 1, "[redis] lock acquire attempt");
        Ok(granted == 1)
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let released: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("lock release script failed for {key}"))?;
        debug!(key = %key, released = released == 1, "[redis] lock release attempt");
        Ok(released == 1)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
