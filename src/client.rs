//! Cache client - guarded load-with-fallback strategies
//!
//! [`CacheClient`] resolves typed values by key, falling back to a
//! caller-supplied loader on miss and writing the result back through the
//! store. Three read strategies cover the classic cache failure modes:
//!
//! - [`CacheClient::get`] — pass-through with **penetration protection**:
//!   confirmed-absent identifiers are negatively cached so repeated misses
//!   never reach the data source.
//! - [`CacheClient::get_with_logical_expiry`] — **stale-while-revalidate**
//!   for pre-warmed hot keys: entries carry an application-level expiry
//!   timestamp, stale reads return immediately and at most one background
//!   rebuild per key runs on a bounded worker pool.
//! - [`CacheClient::get_with_mutex`] — **stampede protection** with
//!   consistency: on a true miss, contenders race for a per-identifier
//!   distributed lock; the winner loads, the rest retry the lookup until the
//!   cache is populated.
//!
//! Keys are composed as `prefix + identifier`. A cached empty string is the
//! negative marker meaning "confirmed absent as of a short TTL", distinct
//! from an uncached key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CacheError;
use crate::lock::DistributedLock;
use crate::rebuild::RebuildPool;
use crate::store::CacheStore;

/// Tuning knobs for [`CacheClient`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for negative markers; bounds how long a "confirmed absent"
    /// verdict suppresses loader calls.
    pub negative_ttl: Duration,
    /// Physical expiry for the per-identifier locks taken by the mutex and
    /// logical-expiry read paths.
    pub lock_expiry: Duration,
    /// Pause between lookup retries on the mutex read path while another
    /// holder is reloading the key.
    pub mutex_retry_delay: Duration,
    /// Retry budget for the mutex read path before giving up with
    /// [`CacheError::LockContended`].
    pub mutex_max_retries: u32,
    /// Worker count for the background rebuild pool.
    pub rebuild_workers: usize,
    /// Prefix for per-identifier lock keys.
    pub lock_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            negative_ttl: Duration::from_secs(120),
            lock_expiry: Duration::from_secs(10),
            mutex_retry_delay: Duration::from_millis(50),
            mutex_max_retries: 200,
            rebuild_workers: 10,
            lock_prefix: "lock:".to_string(),
        }
    }
}

/// Stored form of a logical-expiry entry: the payload plus the timestamp
/// after which it counts as stale. Written without physical TTL — the
/// logical timestamp, not store expiry, is what readers check.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    data: T,
    expires_at_ms: u64,
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

async fn write_envelope<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let envelope = Envelope {
        data: value,
        expires_at_ms: epoch_millis().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
    };
    let raw = serde_json::to_string(&envelope).map_err(|source| CacheError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw).await.map_err(CacheError::Store)
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    stale_serves: AtomicU64,
    rebuilds: AtomicU64,
}

/// Snapshot of the client's counters.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub requests: u64,
    /// Fresh-payload hits across all strategies.
    pub hits: u64,
    /// Lookups answered by a negative marker without touching the loader.
    pub negative_hits: u64,
    pub misses: u64,
    /// Logically-expired payloads served while a rebuild was pending.
    pub stale_serves: u64,
    /// Background rebuilds actually triggered (lock wins).
    pub rebuilds: u64,
    pub hit_rate: f64,
}

/// Request-facing cache component.
///
/// Wraps a [`CacheStore`] and a [`DistributedLock`] and owns a bounded
/// background pool for stale-entry rebuilds. Each instance carries a unique
/// owner value for the locks it takes, so releases from one instance cannot
/// clobber locks held by another.
pub struct CacheClient {
    store: Arc<dyn CacheStore>,
    lock: DistributedLock,
    owner: String,
    config: CacheConfig,
    rebuild_pool: RebuildPool,
    stats: Counters,
}

impl CacheClient {
    /// Create a client over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        info!(
            store = store.name(),
            rebuild_workers = config.rebuild_workers,
            "initializing cache client"
        );
        Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            owner: Uuid::new_v4().to_string(),
            rebuild_pool: RebuildPool::new(config.rebuild_workers),
            stats: Counters::default(),
            store,
            config,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Serialize `value` and store it under `key` with a physical TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] or [`CacheError::Store`].
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store
            .set_with_ttl(key, &raw, ttl)
            .await
            .map_err(CacheError::Store)
    }

    /// Store `value` under `key` wrapped in a logical-expiry envelope.
    ///
    /// The entry never physically expires; it becomes *stale* once `ttl`
    /// has elapsed, at which point [`CacheClient::get_with_logical_expiry`]
    /// serves it while rebuilding in the background. Use this to pre-warm
    /// hot keys.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] or [`CacheError::Store`].
    pub async fn set_with_logical_expiry<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        write_envelope(self.store.as_ref(), key, &value, ttl).await
    }

    /// Pass-through read with cache-penetration protection.
    ///
    /// On a hit the cached payload is returned; on a negative-marker hit
    /// `Ok(None)` is returned without calling the loader; on a true miss the
    /// loader runs, and its result — value or confirmed absence — is written
    /// back before returning.
    ///
    /// No locking: the only protected concern is repeated-miss
    /// amplification. Concurrent first-access loads may each hit the data
    /// source; that race is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`], [`CacheError::Decode`],
    /// [`CacheError::Encode`], or [`CacheError::Loader`].
    pub async fn get<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let key = format!("{key_prefix}{id}");

        match self.store.get(&key).await.map_err(CacheError::Store)? {
            Some(raw) if !raw.is_empty() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|source| CacheError::Decode { key, source })
            }
            Some(_) => {
                self.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "negative marker hit");
                Ok(None)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss, invoking loader");
                self.load_and_store(&key, ttl, loader).await
            }
        }
    }

    /// Stale-tolerant read for pre-warmed hot keys.
    ///
    /// An absent key returns `Ok(None)` — this path never falls through to
    /// a synchronous load, keeping hot-path latency bounded; populate
    /// entries up front with [`CacheClient::set_with_logical_expiry`].
    ///
    /// A fresh entry is returned as-is. A stale entry is returned
    /// immediately as well, and if this call wins the per-identifier lock a
    /// rebuild is queued on the background pool: the loader runs, the
    /// envelope is rewritten, and the lock is released whether or not the
    /// loader succeeds. Loader failures during rebuild are logged, never
    /// propagated — the caller already has the stale value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] or [`CacheError::Decode`]. A corrupt
    /// envelope is an error, not a miss.
    pub async fn get_with_logical_expiry<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let key = format!("{key_prefix}{id}");

        let Some(raw) = self.store.get(&key).await.map_err(CacheError::Store)? else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "logical-expiry miss on cold key");
            return Ok(None);
        };
        let envelope: Envelope<T> =
            serde_json::from_str(&raw).map_err(|source| CacheError::Decode {
                key: key.clone(),
                source,
            })?;
        if envelope.expires_at_ms > epoch_millis() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(envelope.data));
        }

        self.stats.stale_serves.fetch_add(1, Ordering::Relaxed);
        let lock_key = format!("{}{id}", self.config.lock_prefix);
        if self
            .lock
            .try_acquire(&lock_key, &self.owner, self.config.lock_expiry)
            .await?
        {
            self.stats.rebuilds.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "stale entry, rebuild queued");
            let store = Arc::clone(&self.store);
            let lock = self.lock.clone();
            let owner = self.owner.clone();
            let rebuild_key = key;
            self.rebuild_pool
                .submit(async move {
                    match loader().await {
                        Ok(Some(value)) => {
                            if let Err(err) =
                                write_envelope(store.as_ref(), &rebuild_key, &value, ttl).await
                            {
                                warn!(key = %rebuild_key, error = %err, "rebuild write failed");
                            }
                        }
                        Ok(None) => {
                            warn!(key = %rebuild_key, "loader found nothing during rebuild, keeping stale entry");
                        }
                        Err(err) => {
                            warn!(key = %rebuild_key, error = %err, "rebuild loader failed");
                        }
                    }
                    if let Err(err) = lock.release(&lock_key, &owner).await {
                        warn!(key = %lock_key, error = %err, "rebuild lock release failed");
                    }
                })
                .await;
        }
        // Serve the stale payload either way; the caller never blocks on the
        // rebuild.
        Ok(Some(envelope.data))
    }

    /// Mutex-guarded read with cache-stampede protection.
    ///
    /// Hit and negative-marker lookups short-circuit exactly as in
    /// [`CacheClient::get`]. On a true miss, contenders race for the
    /// per-identifier lock: the winner calls the loader once and writes the
    /// result back; everyone else sleeps briefly and retries the lookup, so
    /// the data source sees a single load no matter how many callers miss
    /// concurrently. The retry loop is bounded; exhausting it yields
    /// [`CacheError::LockContended`].
    ///
    /// The winner does not re-check the cache after acquiring the lock —
    /// every lock holder calls the loader once.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`], [`CacheError::Decode`],
    /// [`CacheError::Encode`], [`CacheError::LockContended`], or
    /// [`CacheError::Loader`] (re-thrown after the lock is released).
    pub async fn get_with_mutex<T, F, Fut>(
        &self,
        key_prefix: &str,
        id: impl Display,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let key = format!("{key_prefix}{id}");
        let lock_key = format!("{}{id}", self.config.lock_prefix);

        let mut attempts: u32 = 0;
        loop {
            match self.store.get(&key).await.map_err(CacheError::Store)? {
                Some(raw) if !raw.is_empty() => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return serde_json::from_str(&raw)
                        .map(Some)
                        .map_err(|source| CacheError::Decode { key, source });
                }
                Some(_) => {
                    self.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                None => {}
            }
            if self
                .lock
                .try_acquire(&lock_key, &self.owner, self.config.lock_expiry)
                .await?
            {
                break;
            }
            attempts += 1;
            if attempts >= self.config.mutex_max_retries {
                warn!(key = %key, attempts, "mutex retry budget exhausted");
                return Err(CacheError::LockContended { key, attempts });
            }
            sleep(self.config.mutex_retry_delay).await;
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "lock won, invoking loader");
        let outcome = self.load_and_store(&key, ttl, loader).await;
        if let Err(err) = self.lock.release(&lock_key, &self.owner).await {
            warn!(key = %lock_key, error = %err, "mutex lock release failed");
        }
        outcome
    }

    /// Wait for all queued background rebuilds to finish.
    ///
    /// Call before dropping the client when pending rebuilds must land;
    /// otherwise unfinished rebuild locks are reclaimed by their physical
    /// expiry.
    pub async fn shutdown(&self) {
        self.rebuild_pool.shutdown().await;
    }

    /// Snapshot the client's counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let requests = self.stats.requests.load(Ordering::Relaxed);
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let negative_hits = self.stats.negative_hits.load(Ordering::Relaxed);
        CacheStats {
            requests,
            hits,
            negative_hits,
            misses: self.stats.misses.load(Ordering::Relaxed),
            stale_serves: self.stats.stale_serves.load(Ordering::Relaxed),
            rebuilds: self.stats.rebuilds.load(Ordering::Relaxed),
            hit_rate: if requests > 0 {
                (hits + negative_hits) as f64 / requests as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Run the loader and write its result back: a value goes in with the
    /// caller's TTL, confirmed absence becomes a short-lived negative
    /// marker.
    async fn load_and_store<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<T>>>,
    {
        match loader().await.map_err(CacheError::Loader)? {
            Some(value) => {
                self.set(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                debug!(key = %key, "loader confirmed absence, writing negative marker");
                self.store
                    .set_with_ttl(key, "", self.config.negative_ttl)
                    .await
                    .map_err(CacheError::Store)?;
                Ok(None)
            }
        }
    }
}

#[cfg(feature = "redis")]
impl CacheClient {
    /// Connect to Redis and build a client with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be established.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let store = crate::store::RedisStore::connect(redis_url).await?;
        Ok(Self::new(Arc::new(store), CacheConfig::default()))
    }

    /// Connect using `REDIS_URL` (default `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be established.
    pub async fn connect_from_env() -> anyhow::Result<Self> {
        let store = crate::store::RedisStore::connect_from_env().await?;
        Ok(Self::new(Arc::new(store), CacheConfig::default()))
    }
}
