//! Distributed mutual-exclusion lock
//!
//! A named lock backed by a shared [`CacheStore`], implemented entirely
//! through the store's atomic scripted check-and-set and check-and-delete
//! operations. Works across processes as well as threads; the lock's
//! physical expiry is the crash-safety net when a holder dies without
//! releasing.
//!
//! Timed acquisition is a spin-wait, not a queue — there is no fairness
//! guarantee across waiters.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::error::CacheError;
use crate::store::CacheStore;

/// Lock expiry used by [`DistributedLock::acquire_with_timeout`] attempts.
pub const DEFAULT_LOCK_EXPIRY: Duration = Duration::from_secs(60);

/// Pause between spin-wait attempts.
const SPIN_INTERVAL: Duration = Duration::from_millis(1);

/// Named mutual-exclusion lock over a shared store.
///
/// A lock is a key-value pair: the key names the resource, the value
/// identifies the owner. Release compares the stored value against the
/// caller's owner value before deleting, so a holder whose lock already
/// expired can never delete a lock re-acquired by someone else.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
}

impl DistributedLock {
    /// Create a lock handle over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Single non-blocking acquisition attempt.
    ///
    /// Returns `Ok(true)` iff this caller now holds `key`. Store
    /// communication failures propagate.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store cannot be reached.
    pub async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        expiry: Duration,
    ) -> Result<bool, CacheError> {
        self.store
            .acquire_lock(key, owner, expiry)
            .await
            .map_err(CacheError::Store)
    }

    /// Spin until the lock is acquired or `max_wait` elapses.
    ///
    /// Each attempt uses [`DEFAULT_LOCK_EXPIRY`] as the lock's physical
    /// expiry. Returns `Ok(false)` on timeout — timing out is an expected
    /// outcome, not an error; callers decide whether to proceed without the
    /// lock or fail their request.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store cannot be reached.
    pub async fn acquire_with_timeout(
        &self,
        key: &str,
        owner: &str,
        max_wait: Duration,
    ) -> Result<bool, CacheError> {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.try_acquire(key, owner, DEFAULT_LOCK_EXPIRY).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!(key = %key, max_wait_ms = %max_wait.as_millis(), "lock wait timed out");
                return Ok(false);
            }
            sleep(SPIN_INTERVAL).await;
        }
    }

    /// Release the lock if this caller still holds it.
    ///
    /// Returns `Ok(true)` iff the key was deleted; `Ok(false)` means the
    /// lock had already expired, or is now held by a different owner, and
    /// nothing was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the store cannot be reached.
    pub async fn release(&self, key: &str, owner: &str) -> Result<bool, CacheError> {
        self.store
            .release_lock(key, owner)
            .await
            .map_err(CacheError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn acquire_with_timeout_spins_until_released() {
        let lock = lock();
        assert!(
            lock.try_acquire("job", "a", Duration::from_secs(60))
                .await
                .unwrap()
        );

        let contender = lock.clone();
        let waiter = tokio::spawn(async move {
            contender
                .acquire_with_timeout("job", "b", Duration::from_millis(500))
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(lock.release("job", "a").await.unwrap());
        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn acquire_with_timeout_gives_up() {
        let lock = lock();
        assert!(
            lock.try_acquire("job", "a", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !lock
                .acquire_with_timeout("job", "b", Duration::from_millis(30))
                .await
                .unwrap()
        );
    }
}
