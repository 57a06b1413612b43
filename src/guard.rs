//! Duplicate-submission guard
//!
//! Rejects identical concurrent requests by racing them for a distributed
//! lock derived from the request's identity and body. The lock is held for
//! the duration of the guarded operation and released when it completes, so
//! only truly overlapping duplicates are rejected.
//!
//! Key derivation is an explicit function of the request — application name,
//! handler name, caller identity, and a fingerprint of the request body —
//! with no runtime metadata inspection.

use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CacheError;
use crate::lock::DistributedLock;
use crate::store::CacheStore;

/// Build the lock key for a request.
///
/// Layout: `app:handler:<hex sha256(identity + body)>`. `identity` is
/// whatever distinguishes the caller (selected header values, a user id);
/// `body` is the serialized request payload. Two requests collide iff all
/// four parts match.
#[must_use]
pub fn submit_key(app: &str, handler: &str, identity: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(body.as_bytes());
    let fingerprint = hex::encode(hasher.finalize());
    format!("{app}:{handler}:{fingerprint}")
}

/// Guard that serializes identical requests through a distributed lock.
pub struct SubmitGuard {
    lock: DistributedLock,
}

impl SubmitGuard {
    /// Create a guard over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            lock: DistributedLock::new(store),
        }
    }

    /// Run `op` under the request lock for `key`.
    ///
    /// Waits up to `max_wait` for the lock; if an identical request still
    /// holds it past that, returns [`CacheError::DuplicateRequest`] without
    /// running `op`. The lock is released on every path; an error from `op`
    /// is re-thrown after release.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DuplicateRequest`], [`CacheError::Store`], or
    /// [`CacheError::Loader`] wrapping `op`'s failure.
    pub async fn run<T, F, Fut>(
        &self,
        key: &str,
        max_wait: Duration,
        op: F,
    ) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let owner = Uuid::new_v4().to_string();
        if !self.lock.acquire_with_timeout(key, &owner, max_wait).await? {
            debug!(key = %key, "duplicate request rejected");
            return Err(CacheError::DuplicateRequest {
                key: key.to_string(),
            });
        }

        let outcome = op().await.map_err(CacheError::Loader);
        if let Err(err) = self.lock.release(key, &owner).await {
            warn!(key = %key, error = %err, "request lock release failed");
        }
        outcome
    }
}
