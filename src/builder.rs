//! Cache client builder
//!
//! Builder for constructing a [`CacheClient`] with a custom store backend
//! or tuned configuration.
//!
//! # Example: in-process store
//!
//! ```rust
//! use guarded_cache::{CacheClientBuilder, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let client = CacheClientBuilder::new()
//!     .with_store(Arc::new(MemoryStore::new()))
//!     .build()
//!     .await?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Result;

use crate::client::{CacheClient, CacheConfig};
use crate::store::CacheStore;

/// Builder for [`CacheClient`].
///
/// With no store configured, `build()` connects to Redis via `REDIS_URL`
/// (requires the default `redis` feature).
pub struct CacheClientBuilder {
    store: Option<Arc<dyn CacheStore>>,
    config: CacheConfig,
}

impl CacheClientBuilder {
    /// Start with the default configuration and no store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            config: CacheConfig::default(),
        }
    }

    /// Use a custom store backend.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Size of the background rebuild pool.
    #[must_use]
    pub fn rebuild_workers(mut self, workers: usize) -> Self {
        self.config.rebuild_workers = workers;
        self
    }

    /// TTL for negative ("confirmed absent") markers.
    #[must_use]
    pub fn negative_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.config.negative_ttl = ttl;
        self
    }

    /// Build the client, connecting to Redis if no store was provided.
    ///
    /// # Errors
    ///
    /// Returns an error if the default Redis store cannot connect, or if no
    /// store was configured and the `redis` feature is disabled.
    pub async fn build(self) -> Result<CacheClient> {
        let store = match self.store {
            Some(store) => store,
            None => Self::default_store().await?,
        };
        Ok(CacheClient::new(store, self.config))
    }

    #[cfg(feature = "redis")]
    async fn default_store() -> Result<Arc<dyn CacheStore>> {
        let store = crate::store::RedisStore::connect_from_env().await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis"))]
    async fn default_store() -> Result<Arc<dyn CacheStore>> {
        anyhow::bail!("no cache store configured and the `redis` feature is disabled")
    }
}

impl Default for CacheClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
