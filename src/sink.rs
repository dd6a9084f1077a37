use crate::message::Frame;
use axum::response::sse::Event;
use std::convert::Infallible;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Error returned when a sink's underlying transport is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

impl fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink transport closed")
    }
}

impl std::error::Error for SinkClosed {}

/// A write-only handle into one physical streaming transport.
///
/// A connection exclusively owns its sink for the connection's lifetime. A
/// failed `write` means the transport is dead and the connection must be
/// evicted; `close` is best-effort and implementations swallow their own
/// failures rather than propagate them.
pub trait EventSink: Send + Sync {
    /// Push one frame into the transport without blocking.
    fn write(&self, frame: &Frame) -> Result<(), SinkClosed>;

    /// Release the transport. Default is a no-op for transports that close
    /// when the sink is dropped.
    fn close(&self) {}
}

/// Production sink: forwards frames into the mpsc channel drained by the SSE
/// response stream.
///
/// Sends never block; a send error means the receiving stream has been
/// dropped, i.e. the peer went away.
pub struct ChannelSink {
    sender: UnboundedSender<Result<Event, Infallible>>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<Result<Event, Infallible>>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn write(&self, frame: &Frame) -> Result<(), SinkClosed> {
        self.sender
            .send(Ok(frame.to_sse_event()))
            .map_err(|_| SinkClosed)
    }

    // Dropping the sender closes the channel, so the default close() applies.
}
