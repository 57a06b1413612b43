//! `MemoryStore` - in-process store backend
//!
//! A lightweight `DashMap`-backed implementation of [`CacheStore`] with
//! manual TTL tracking. Serves as the test double for the Redis adapter and
//! works as a real backend for single-process deployments.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, Instant};
use tracing::debug;

use super::CacheStore;

/// Stored value with optional expiration tracking.
#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// In-process [`CacheStore`] backed by a concurrent map.
///
/// Expired entries are dropped lazily on read; the per-key atomicity of the
/// lock operations comes from the `DashMap` entry API, which holds the
/// key's shard lock for the whole check-and-set / check-and-delete step.
///
/// There is no automatic eviction — call [`MemoryStore::cleanup_expired`]
/// periodically if unbounded growth matters for your workload.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, stored| {
            if stored.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[memory] dropped expired entries");
        }
        removed
    }

    /// Number of live plus not-yet-reaped entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(stored) = self.entries.get(key) {
            if stored.is_expired() {
                drop(stored);
                self.entries.remove_if(key, |_, stored| stored.is_expired());
                return Ok(None);
            }
            return Ok(Some(stored.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value.to_string(), None));
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value.to_string(), Some(ttl)));
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[memory] stored key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, owner: &str, expiry: Duration) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired() {
                    slot.insert(StoredValue::new(owner.to_string(), Some(expiry)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(owner.to_string(), Some(expiry)));
                Ok(true)
            }
        }
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                if !slot.get().is_expired() && slot.get().value == owner {
                    slot.remove();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
