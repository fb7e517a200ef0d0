// src/engine/backend.rs

//! Pluggable action backend.
//!
//! The dispatcher talks to an `ActionBackend` so tests can record which events
//! would have triggered work without side effects.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::types::CoalescedEvent;

pub trait ActionBackend: Send + Sync + 'static {
    /// Run the configured actions for one accepted event.
    ///
    /// The future may be dropped before completion when a newer event
    /// supersedes this one.
    fn run(&self, event: CoalescedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

/// Reports every accepted change on stdout and in the log.
#[derive(Debug, Clone, Default)]
pub struct LoggingBackend;

impl LoggingBackend {
    pub fn describe(event: &CoalescedEvent) -> String {
        format!("File '{}' was '{}'", event.path.display(), event.kind)
    }
}

impl ActionBackend for LoggingBackend {
    fn run(&self, event: CoalescedEvent) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let line = Self::describe(&event);
            info!(path = ?event.path, kind = %event.kind, "change accepted");
            println!("{line}");
            Ok(())
        })
    }
}
