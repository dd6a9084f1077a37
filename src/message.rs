use axum::response::sse::Event;
use chrono::Utc;
use serde_json::{json, Value};

/// Reserved event name for the confirmation frame sent once, immediately
/// after a connection is registered.
pub const CONNECTED_EVENT: &str = "connected";

/// Reserved event name for the periodic liveness probe.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// One serialized event: a name plus a JSON-encoded data payload.
///
/// The payload is carried as pre-serialized JSON and passed through opaquely;
/// the registry never interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    event: String,
    data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: &Value) -> Self {
        Self {
            event: event.into(),
            data: payload.to_string(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// The newline-delimited SSE wire form of this frame:
    /// `event: <name>\ndata: <json>\n\n`.
    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }

    /// Convert into the axum SSE event used by the channel transport.
    pub fn to_sse_event(&self) -> Event {
        Event::default().event(&self.event).data(&self.data)
    }
}

/// Confirmation frame queued as the first event on a fresh connection.
pub(crate) fn connected_frame(client_id: &str, name: Option<&str>) -> Frame {
    Frame::new(
        CONNECTED_EVENT,
        &json!({
            "message": "connection established",
            "ts": Utc::now().timestamp_millis(),
            "clientId": client_id,
            "name": name,
        }),
    )
}

/// Liveness probe frame written to every connection on each heartbeat tick.
pub(crate) fn heartbeat_frame() -> Frame {
    Frame::new(HEARTBEAT_EVENT, &json!({ "ts": Utc::now().timestamp_millis() }))
}
