// src/pipeline/settle.rs

//! Settle delay: the second coalescing stage.
//!
//! Every event released by the burst stage waits for the configured delay
//! before its action runs. A newer event arriving in the meantime abandons
//! the older one, whether it is still waiting or already running its action.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::pipeline::sink::EventSink;
use crate::pipeline::slot::PendingSlot;
use crate::types::CoalescedEvent;

#[derive(Debug)]
pub struct Settle<S> {
    delay: Duration,
    pending: PendingSlot,
    sink: Arc<S>,
}

impl<S: EventSink> Settle<S> {
    pub fn new(delay: Duration, sink: Arc<S>) -> Self {
        Self {
            delay,
            pending: PendingSlot::new(),
            sink,
        }
    }

    /// Schedule the action for `event`, abandoning the previous one.
    ///
    /// Must be called within a Tokio runtime.
    pub fn submit(&self, event: CoalescedEvent) {
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;
        self.pending.replace_with(move || {
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                trace!(path = ?event.path, kind = %event.kind, "settled; running action");
                sink.handle(event).await;
            })
            .abort_handle()
        });
    }
}
