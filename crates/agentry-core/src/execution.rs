//! Execution mode selection and the background worker pool.
//!
//! Background dispatches are submitted to a [`BackgroundPool`]: submission
//! never waits, a semaphore bounds how many tasks run at once, and a
//! `TaskTracker` lets shutdown wait for every accepted task to finish.

use std::future::Future;
use std::sync::Arc;

use agentry_types::process::ExecutionMode;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Pick the execution mode for one dispatch.
///
/// An explicit preference wins. Otherwise a callback target implies
/// background execution and its absence implies synchronous execution.
pub fn resolve_mode(explicit: Option<ExecutionMode>, callback_url: Option<&str>) -> ExecutionMode {
    match explicit {
        Some(mode) => mode,
        None if callback_url.is_some() => ExecutionMode::Background,
        None => ExecutionMode::Sync,
    }
}

/// Returned by [`BackgroundPool::submit`] after shutdown has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("background pool is closed")]
pub struct PoolClosed;

/// Bounded pool for detached dispatch work.
#[derive(Clone)]
pub struct BackgroundPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    workers: usize,
}

impl BackgroundPool {
    /// Create a pool running at most `workers` tasks at once (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            tracker: TaskTracker::new(),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks accepted and not yet finished, queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Queue `task` and return immediately. The task waits for a permit
    /// inside the pool, never on the caller.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(PoolClosed);
        }
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        Ok(())
    }

    /// Stop accepting work and wait for every accepted task to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "waiting for background dispatches");
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for BackgroundPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundPool")
            .field("workers", &self.workers)
            .field("in_flight", &self.tracker.len())
            .field("closed", &self.tracker.is_closed())
            .finish()
    }
}
