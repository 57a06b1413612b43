//! Common utilities for integration tests
//!
//! Shared infrastructure: client setup over the in-process store, counting
//! loaders, test entities, and polling helpers.

#![allow(dead_code)]

use guarded_cache::{CacheClient, CacheConfig, MemoryStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Initialize tracing once for the whole test binary.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Config with timings tightened for tests.
pub fn fast_config() -> CacheConfig {
    CacheConfig {
        mutex_retry_delay: Duration::from_millis(5),
        mutex_max_retries: 400,
        ..CacheConfig::default()
    }
}

/// Client over a shared in-process store.
pub fn memory_client(config: CacheConfig) -> (Arc<CacheClient>, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(CacheClient::new(store.clone(), config));
    (client, store)
}

/// Unique identifier so tests sharing a store never collide.
pub fn test_id(name: &str) -> String {
    format!("{}_{}", name, rand::random::<u32>())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: u64,
    pub total: u64,
}

impl Order {
    pub fn new(id: u64) -> Self {
        Self { id, total: id * 10 }
    }
}

/// Shared loader-invocation counter.
pub fn call_counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

pub fn count_of(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
