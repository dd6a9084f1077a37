//! Real-time event dispatch over Server-Sent Events (SSE).
//!
//! This crate tracks open streaming connections keyed by client identity and
//! pushes named, JSON-payload events to one client's connections or to all of
//! them, reaping dead connections via a periodic heartbeat.
//!
//! # Architecture
//!
//! - **Many connections per client**: a client id is an opaque identity that
//!   may hold several simultaneous connections (tabs, devices); events
//!   addressed to a client reach every one of them.
//! - **Dual-index registry**: O(1) lookups for both connection cleanup and
//!   client-scoped routing via separate DashMap indices.
//! - **Best-effort delivery**: events are ephemeral. A failed write means the
//!   connection is dead; it is evicted on the spot and delivery to the
//!   remaining connections continues. Nothing is persisted or replayed.
//! - **Heartbeat reaping**: a single lazily started loop probes every
//!   connection on a fixed period, refreshing liveness timestamps and
//!   evicting connections whose transport is gone.
//! - **Opaque payloads**: event payloads are caller-supplied JSON values,
//!   passed through without interpretation.
//!
//! # Message Flow
//!
//! 1. The HTTP layer opens a stream via [`create_stream`], which registers a
//!    channel-backed connection and queues a `connected` confirmation frame.
//! 2. Application code pushes events through [`Manager::send_to_client`] or
//!    [`Manager::broadcast`]; frames fan out to the targeted connections.
//! 3. The heartbeat loop probes every connection each period; a failed probe
//!    or a failed send evicts exactly that connection.
//! 4. When the peer disconnects, the stream's drop guard removes the
//!    connection; at worst a vanished peer survives one heartbeat period.
//!
//! # Example: pushing an event
//!
//! ```rust,ignore
//! use serde_json::json;
//!
//! // In a handler, after some state changed
//! app_state
//!     .relay
//!     .send_to_client(&client_id, "task_completed", &json!({ "taskId": id }));
//! ```
//!
//! # Modules
//!
//! - `connection`: `ConnectionRegistry` with dual-index storage and type-safe
//!   `ConnectionId`
//! - `manager`: the collaborator-facing facade (dispatch, introspection,
//!   heartbeat startup)
//! - `message`: event frames, reserved event names, and the SSE wire form
//! - `sink`: the write seam between the registry and a streaming transport
//! - `heartbeat`: the periodic liveness probe
//! - `metrics`: aggregate counts and per-client read models
//! - `stream`: SSE response construction for the HTTP layer

pub mod connection;
pub mod heartbeat;
pub mod manager;
pub mod message;
pub mod metrics;
pub mod sink;
pub mod stream;

pub use manager::Manager;
pub use stream::create_stream;
