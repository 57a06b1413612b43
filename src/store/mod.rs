//! Key-value store adapters
//!
//! The cache client and distributed lock run against the [`CacheStore`]
//! trait: a minimal contract over a remote string-keyed store supporting
//! get / set-with-TTL / delete plus two atomic lock operations.
//!
//! # Built-in adapters
//!
//! - [`RedisStore`] — the default distributed backend (feature `redis`),
//!   implementing the lock operations as server-side Lua scripts
//! - [`MemoryStore`] — a `DashMap`-backed in-process store with manual TTL
//!   tracking, used in tests and single-process deployments
//!
//! # Value semantics
//!
//! Values are strings. `Ok(None)` from [`CacheStore::get`] means the key is
//! absent; an **empty string** is a real stored value — the cache client uses
//! it as its negative marker ("confirmed absent") — so adapters must never
//! collapse empty values into `None`.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

/// Contract the cache client and lock consume from a backing store.
///
/// Implementations must be `Send + Sync` for concurrent access across async
/// tasks. All mutation goes through atomic single-key operations; no
/// multi-key transactions are required.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or physically expired.
    /// An empty string is a real value and must be returned as
    /// `Ok(Some(String::new()))`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` with no physical expiration.
    ///
    /// Used for logical-expiry envelopes, whose staleness is decided by an
    /// application-level timestamp rather than store expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Store `value` under `key` with a physical time-to-live.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Atomically set `key = owner` only if the key is absent, and on
    /// success give the key a physical expiry of `expiry`.
    ///
    /// The whole operation is a single indivisible server-side step — a
    /// separate set followed by a separate expire call is not acceptable.
    /// Returns `Ok(true)` iff the set-if-absent won. If the set wins but the
    /// expiry step fails, implementations still report success: the expiry
    /// is a crash-safety net, not the correctness mechanism.
    async fn acquire_lock(&self, key: &str, owner: &str, expiry: Duration) -> Result<bool>;

    /// Atomically delete `key` only if its current value equals `owner`.
    ///
    /// A single check-and-delete step, never read-then-delete as two calls:
    /// a holder whose lock already expired and was re-acquired by someone
    /// else must not delete the new holder's lock. Returns `Ok(true)` iff
    /// the key was deleted.
    async fn release_lock(&self, key: &str, owner: &str) -> Result<bool>;

    /// Verify the store is reachable and operational.
    async fn health_check(&self) -> bool;

    /// Adapter name, for logging.
    fn name(&self) -> &'static str {
        "unknown"
    }
}
