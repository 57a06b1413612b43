//! Guarded Cache
//!
//! A distributed cache client for Rust implementing the three classic
//! cache-correctness patterns on top of a Lua-scripted Redis lock:
//!
//! - **Penetration protection**: confirmed-absent lookups are negatively
//!   cached with a short TTL, so repeated misses never reach the data source
//! - **Stale-while-revalidate**: hot keys carry a logical expiry timestamp;
//!   stale reads return immediately while a single background rebuild runs
//!   on a bounded worker pool
//! - **Stampede protection**: concurrent true-misses for one key race for a
//!   per-identifier distributed lock, and exactly one loader call reaches
//!   the data source
//!
//! # Quick Start
//!
//! ```rust
//! use guarded_cache::{CacheClient, CacheConfig, MemoryStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Swap MemoryStore for CacheClient::connect("redis://...") in
//!     // production.
//!     let client = CacheClient::new(Arc::new(MemoryStore::new()), CacheConfig::default());
//!
//!     let total: Option<u64> = client
//!         .get("order:", 42, Duration::from_secs(600), || async {
//!             // Authoritative fetch, e.g. a database query.
//!             Ok(Some(100))
//!         })
//!         .await?;
//!     assert_eq!(total, Some(100));
//!
//!     // Second lookup is a cache hit; the loader does not run.
//!     let cached: Option<u64> = client
//!         .get("order:", 42, Duration::from_secs(600), || async {
//!             unreachable!("already cached")
//!         })
//!         .await?;
//!     assert_eq!(cached, Some(100));
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! caller → CacheClient → (miss) loader → write-back via CacheStore
//!                     ↘ per-id DistributedLock (SETNX+EXPIRE / GET+DEL, Lua)
//! ```
//!
//! The [`CacheStore`] trait is the only coupling to the backing store:
//! [`RedisStore`] is the distributed default, [`MemoryStore`] the
//! in-process/test backend, and custom adapters just implement the trait.
//! The same lock primitive also powers [`SubmitGuard`], a
//! duplicate-submission guard for request handlers.

pub mod builder;
pub mod client;
pub mod error;
pub mod guard;
pub mod lock;
mod rebuild;
pub mod store;

pub use builder::CacheClientBuilder;
pub use client::{CacheClient, CacheConfig, CacheStats};
pub use error::CacheError;
pub use guard::{SubmitGuard, submit_key};
pub use lock::{DEFAULT_LOCK_EXPIRY, DistributedLock};
pub use store::{CacheStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;

// Re-export for custom CacheStore implementations.
pub use async_trait::async_trait;
