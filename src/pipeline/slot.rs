// src/pipeline/slot.rs

use std::sync::Mutex;

use tokio::task::AbortHandle;

/// The single pending scheduled task of a pipeline stage.
///
/// Installing a new task aborts the one it replaces, so at most one pending
/// task per stage is ever live. Dropping the slot aborts whatever is pending.
#[derive(Debug, Default)]
pub struct PendingSlot {
    current: Mutex<Option<AbortHandle>>,
}

impl PendingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the pending task (if any), then install the one `schedule`
    /// creates. Both happen under the slot's lock, so concurrent schedulers
    /// cannot leave an older task installed over a newer one.
    pub fn replace_with<F>(&self, schedule: F)
    where
        F: FnOnce() -> AbortHandle,
    {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = current.take() {
            previous.abort();
        }
        *current = Some(schedule());
    }

    /// Abort the pending task, if any.
    pub fn cancel(&self) {
        let previous = match self.current.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
