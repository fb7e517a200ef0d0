// src/engine/dispatcher.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::{trace, warn};

use crate::engine::backend::ActionBackend;
use crate::engine::filter::ActionFilter;
use crate::pipeline::EventSink;
use crate::types::CoalescedEvent;

/// End of the coalescing pipeline: filters events and runs the backend for
/// the ones that pass.
pub struct ActionDispatcher<B> {
    filter: ActionFilter,
    backend: B,
}

impl<B: ActionBackend> fmt::Debug for ActionDispatcher<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<B: ActionBackend> ActionDispatcher<B> {
    pub fn new(filter: ActionFilter, backend: B) -> Self {
        Self { filter, backend }
    }

    pub fn filter(&self) -> &ActionFilter {
        &self.filter
    }
}

impl<B: ActionBackend> EventSink for ActionDispatcher<B> {
    fn handle(&self, event: CoalescedEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if !self.filter.should_run(&event) {
                trace!(path = ?event.path, kind = %event.kind, "skipping file: does not match the settings");
                return;
            }
            let path = event.path.clone();
            if let Err(err) = self.backend.run(event).await {
                warn!(?path, error = %err, "action failed");
            }
        })
    }
}
