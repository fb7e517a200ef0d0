// src/pipeline/burst.rs

//! Burst collapse: the first coalescing stage.
//!
//! Consecutive events with the same path are collapsed into the one already
//! pending. An event with a different path becomes the new pending event and
//! is released after a short quiet period unless something newer replaces it
//! first.
//!
//! Only the single most recently observed event is tracked. Two paths that
//! change alternately faster than the quiet period therefore supersede each
//! other, and the earlier one is never released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::pipeline::slot::PendingSlot;
use crate::types::CoalescedEvent;

/// Default quiet period of the burst stage.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct Observed {
    seq: u64,
    event: CoalescedEvent,
}

#[derive(Debug)]
pub struct BurstCollapse {
    quiet_period: Duration,
    /// The most recently observed event, cleared when it is released.
    latest: Arc<Mutex<Option<Observed>>>,
    next_seq: AtomicU64,
    pending: PendingSlot,
    released: mpsc::UnboundedSender<CoalescedEvent>,
}

fn lock(latest: &Mutex<Option<Observed>>) -> MutexGuard<'_, Option<Observed>> {
    match latest.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl BurstCollapse {
    pub fn new(quiet_period: Duration, released: mpsc::UnboundedSender<CoalescedEvent>) -> Self {
        Self {
            quiet_period,
            latest: Arc::new(Mutex::new(None)),
            next_seq: AtomicU64::new(0),
            pending: PendingSlot::new(),
            released,
        }
    }

    /// Feed one event. Returns `true` if a release was scheduled for it,
    /// `false` if it was collapsed into the pending event.
    ///
    /// Must be called within a Tokio runtime.
    pub fn observe(&self, event: CoalescedEvent) -> bool {
        let mut latest = lock(&self.latest);
        if latest.as_ref().is_some_and(|o| o.event.path == event.path) {
            trace!(path = ?event.path, "collapsed into pending event");
            return false;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        *latest = Some(Observed { seq, event });

        let slot = Arc::clone(&self.latest);
        let released = self.released.clone();
        let quiet_period = self.quiet_period;
        self.pending.replace_with(move || {
            tokio::spawn(async move {
                tokio::time::sleep(quiet_period).await;
                let event = {
                    let mut latest = lock(&slot);
                    match latest.as_ref() {
                        Some(observed) if observed.seq == seq => latest.take().map(|o| o.event),
                        _ => None,
                    }
                };
                match event {
                    Some(event) => {
                        trace!(path = ?event.path, kind = %event.kind, "released after quiet period");
                        if released.send(event).is_err() {
                            debug!("settle stage gone; released event dropped");
                        }
                    }
                    None => trace!(seq, "stale release superseded"),
                }
            })
            .abort_handle()
        });
        true
    }

    /// Drop the pending event without releasing it.
    pub fn cancel(&self) {
        self.pending.cancel();
        lock(&self.latest).take();
    }
}
