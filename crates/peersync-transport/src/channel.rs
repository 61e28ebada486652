//! Transport abstraction: one bidirectional text-frame channel per connect.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("Channel closed")]
    Closed,
}

/// Something that arrived on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame.
    Frame(String),
    /// A non-terminal transport error.
    Error(String),
}

/// Outbound half of a channel.
///
/// Sends are fire-and-forget; `close` must be idempotent.
pub trait FrameSink: Send + Sync {
    /// Queue a frame for delivery.
    ///
    /// # Errors
    /// Returns error if the channel is closed.
    fn send_frame(&self, frame: String) -> Result<(), TransportError>;

    /// Close the channel.
    fn close(&self);
}

/// An open channel.
///
/// Inbound events end (`recv` yields `None`) exactly once, when the channel
/// closes. Dropping the channel closes it.
pub struct Channel {
    sink: Box<dyn FrameSink>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Channel {
    /// Assemble a channel from its halves.
    #[must_use]
    pub fn new(
        sink: impl FrameSink + 'static,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            sink: Box::new(sink),
            events,
        }
    }

    /// Send a text frame.
    ///
    /// # Errors
    /// Returns error if the channel is closed.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.sink.send_frame(frame.into())
    }

    /// Receive the next inbound event. `None` once closed.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Receive an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Close the channel.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.sink.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens channels to endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open one channel to `endpoint`.
    async fn open(&self, endpoint: &str) -> Result<Channel, TransportError>;
}
