//! Downstream event sink
//!
//! Workers publish normalized [`BookUpdate`]s fire-and-forget; the sink
//! owns buffering and backpressure. The engine never blocks on a full
//! or closed sink.

use tokio::sync::mpsc;
use tracing::debug;

use crate::events::BookUpdate;

/// Consumes normalized book-changed events.
pub trait EventSink: Send + Sync {
    fn publish(&self, update: BookUpdate);
}

/// Sink feeding an in-process queue, e.g. toward a DB writer or
/// multicast publisher task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<BookUpdate>,
}

impl ChannelSink {
    /// Create the sink and the receiving end of its queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BookUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, update: BookUpdate) {
        if self.tx.send(update).is_err() {
            debug!("event sink closed, dropping update");
        }
    }
}

/// Discards every update. Useful in tests and for draining symbols
/// nobody consumes.
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _update: BookUpdate) {}
}
