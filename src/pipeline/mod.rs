// src/pipeline/mod.rs

//! Event coalescing between the watcher and the action stage.
//!
//! Events pushed into a [`CoalescingPipeline`] pass through two stages:
//! [`burst::BurstCollapse`] folds same-path bursts into one event and
//! [`settle::Settle`] waits for the command delay before handing the latest
//! event to the [`EventSink`]. Each stage keeps a single pending slot, so a
//! newer event always supersedes the one before it.

pub mod burst;
pub mod settle;
pub mod sink;
mod slot;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{Result, WatchError};
use crate::types::{ChangeKind, CoalescedEvent};
use crate::watch::FileListener;

pub use burst::{BurstCollapse, DEFAULT_QUIET_PERIOD};
pub use settle::Settle;
pub use sink::{ChannelSink, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Stage A window for collapsing same-path bursts.
    pub quiet_period: Duration,
    /// Stage B delay before the action runs (the user's command delay).
    pub settle_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            settle_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct CoalescingPipeline {
    ingress: mpsc::UnboundedSender<CoalescedEvent>,
    driver: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl CoalescingPipeline {
    /// Start the pipeline driver on the current runtime.
    pub fn spawn<S: EventSink>(options: PipelineOptions, sink: Arc<S>) -> Self {
        let (ingress, mut ingress_rx) = mpsc::unbounded_channel::<CoalescedEvent>();
        let (released_tx, mut released_rx) = mpsc::unbounded_channel::<CoalescedEvent>();

        debug!(
            quiet_ms = options.quiet_period.as_millis() as u64,
            settle_ms = options.settle_delay.as_millis() as u64,
            "starting coalescing pipeline"
        );

        let driver = tokio::spawn(async move {
            let burst = BurstCollapse::new(options.quiet_period, released_tx);
            let settle = Settle::new(options.settle_delay, sink);

            loop {
                tokio::select! {
                    received = ingress_rx.recv() => match received {
                        Some(event) => {
                            burst.observe(event);
                        }
                        None => {
                            debug!("pipeline ingress closed; stopping driver");
                            break;
                        }
                    },
                    Some(event) = released_rx.recv() => settle.submit(event),
                }
            }
        });

        Self {
            ingress,
            driver,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Feed one `(path, kind)` observation into Stage A.
    pub fn push(&self, path: impl Into<PathBuf>, kind: ChangeKind) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WatchError::Closed);
        }
        self.ingress
            .send(CoalescedEvent::new(path, kind))
            .map_err(|_| WatchError::Closed)
    }

    /// A listener that forwards every event it receives into this pipeline.
    ///
    /// Suitable for `FileWatcher::with_root_watcher`.
    pub fn listener(&self) -> FileListener {
        let ingress = self.ingress.clone();
        let closed = Arc::clone(&self.closed);
        Arc::new(move |path: &Path, kind: ChangeKind| {
            if closed.load(Ordering::SeqCst) {
                trace!(?path, "pipeline closed; event ignored");
                return Ok(());
            }
            ingress
                .send(CoalescedEvent::new(path, kind))
                .map_err(|_| anyhow::anyhow!("coalescing pipeline is no longer running"))
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the driver. Pending releases and any in-flight action are
    /// abandoned.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing coalescing pipeline");
        self.driver.abort();
    }
}

impl Drop for CoalescingPipeline {
    fn drop(&mut self) {
        self.close();
    }
}
