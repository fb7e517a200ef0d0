// src/watch/worker_pool.rs

//! Bounded pool for per-notification work.
//!
//! Listener invocation and directory registration are blocking, so each job
//! runs on Tokio's blocking threads. A semaphore caps how many run at once;
//! the notification loop itself never waits for a job.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{trace, warn};

use crate::errors::{Result, WatchError};

pub const MIN_WORKERS: usize = 2;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    jobs: Mutex<JoinSet<()>>,
    size: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("closed", &self.permits.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// `size` is clamped to at least [`MIN_WORKERS`].
    pub fn new(size: usize) -> Self {
        let size = size.max(MIN_WORKERS);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            jobs: Mutex::new(JoinSet::new()),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Queue a blocking job. Must be called from within a Tokio runtime.
    ///
    /// Jobs still waiting for a worker when the pool shuts down are dropped
    /// without running.
    pub fn submit<F>(&self, label: &'static str, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.permits.is_closed() {
            return Err(WatchError::Closed);
        }

        let permits = Arc::clone(&self.permits);
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| anyhow!("worker pool mutex poisoned"))?;

        // Reap finished jobs so the set doesn't grow without bound.
        while jobs.try_join_next().is_some() {}

        jobs.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                trace!(job = label, "pool closed before job started");
                return;
            };
            if let Err(err) = tokio::task::spawn_blocking(job).await {
                if err.is_panic() {
                    warn!(job = label, "worker job panicked");
                }
            }
        });
        Ok(())
    }

    /// Stop accepting jobs and abort the ones not yet running.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        self.permits.close();
        self.jobs
            .lock()
            .map_err(|_| anyhow!("worker pool mutex poisoned"))?
            .abort_all();
        Ok(())
    }
}
