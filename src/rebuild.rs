//! Background rebuild worker pool
//!
//! Bounded pool that runs the stale-while-revalidate rebuild jobs submitted
//! by the cache client. The pool is owned by the client instance — created
//! with it, drained by [`RebuildPool::shutdown`] — rather than being a
//! process-wide singleton, so tests can wait deterministically for rebuilds
//! to land.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// Fixed-capacity worker pool for cache rebuild jobs.
///
/// Jobs are spawned immediately but gate on a semaphore permit before doing
/// any work, so at most `workers` rebuilds run concurrently and the rest
/// queue. A panicking job is contained by its task and never poisons the
/// pool.
pub(crate) struct RebuildPool {
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl RebuildPool {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Queue a rebuild job.
    pub(crate) async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock().await;
        // Reap already-finished jobs so the set does not grow without bound.
        while let Some(finished) = tasks.try_join_next() {
            log_if_panicked(finished);
        }
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }

    /// Wait for every queued and in-flight rebuild to finish.
    pub(crate) async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.join_next().await {
            log_if_panicked(finished);
        }
    }
}

fn log_if_panicked(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            warn!(error = %err, "cache rebuild task panicked");
        }
    }
}
