//! SSE response construction for the HTTP collaborator.
//!
//! The HTTP layer owns routing and authentication; this module owns the
//! transport plumbing: registering a channel-backed connection, queueing the
//! confirmation frame, and tearing the connection down when the peer goes
//! away.

use crate::connection::ConnectionId;
use crate::manager::Manager;
use crate::sink::ChannelSink;
use async_stream::stream;
use axum::response::sse::{Event, Sse};
use futures::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Removes its connection when dropped, whether the stream ran to completion
/// or the peer cancelled mid-flight.
struct ConnectionGuard {
    manager: Arc<Manager>,
    client_id: String,
    connection_id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!("stream for client {} closed, cleaning up", self.client_id);
        self.manager.remove_connection(&self.connection_id);
    }
}

/// Open a long-lived SSE response bound to `client_id`.
///
/// Registers a channel-backed connection, immediately queues the
/// confirmation frame, then yields frames as dispatch and the heartbeat
/// write them. Dropping the response (peer disconnect) removes the
/// connection from the registry.
pub fn create_stream(
    manager: Arc<Manager>,
    client_id: impl Into<String>,
    name: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = client_id.into();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let connection_id =
        manager.add_connection(client_id.clone(), Box::new(ChannelSink::new(tx)), name.clone());
    manager.confirm_connection(&client_id, &connection_id, name.as_deref());

    let guard = ConnectionGuard {
        manager,
        client_id,
        connection_id,
    };

    let stream = stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            yield event;
        }
    };

    Sse::new(stream)
}
