//! Error types for the guarded cache client.
//!
//! Store-communication failures and corrupt cached payloads are surfaced as
//! errors rather than being silently treated as misses; business-level
//! absence (the loader finding nothing) is represented as `Ok(None)` on the
//! read paths, never as an error.

use thiserror::Error;

/// Errors produced by the cache client, the distributed lock, and the
/// duplicate-submission guard.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Communication with the backing key-value store failed. The client
    /// never retries these internally; retries, if any, belong to the store
    /// adapter.
    #[error("cache store operation failed")]
    Store(#[source] anyhow::Error),

    /// A cached payload could not be deserialized. Treated as a defect in
    /// the stored data, not as a cache miss.
    #[error("cached payload for `{key}` could not be decoded")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized for caching.
    #[error("value for `{key}` could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The mutex-guarded read path exhausted its retry budget waiting for
    /// another holder to finish reloading the key.
    #[error("gave up waiting for the rebuild lock on `{key}` after {attempts} attempts")]
    LockContended { key: String, attempts: u32 },

    /// The duplicate-submission guard could not obtain the request lock
    /// within its wait budget, meaning an identical request is in flight.
    #[error("duplicate request rejected for `{key}`")]
    DuplicateRequest { key: String },

    /// The caller-supplied load operation failed. On lock-guarded paths the
    /// lock is always released before this is returned.
    #[error("caller-supplied load operation failed")]
    Loader(#[source] anyhow::Error),
}
