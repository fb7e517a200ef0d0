// src/pipeline/sink.rs

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::CoalescedEvent;

/// Receiver of coalesced events at the end of the pipeline.
///
/// The returned future is the "action" for one event. It may be dropped at
/// any await point when a newer event supersedes it, so it must not rely on
/// running to completion.
pub trait EventSink: Send + Sync + 'static {
    fn handle(&self, event: CoalescedEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sink that forwards every released event into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CoalescedEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<CoalescedEvent>) -> Self {
        Self { tx }
    }

    /// Convenience constructor returning the receiving end as well.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoalescedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: CoalescedEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(err) = self.tx.send(event) {
                debug!(event = ?err.0, "coalesced event dropped: receiver closed");
            }
        })
    }
}
