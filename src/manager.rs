use crate::connection::{ConnectionId, ConnectionRegistry, Delivery};
use crate::heartbeat;
use crate::message::{self, Frame};
use crate::metrics::{self, ClientDetails, ConnectionMetrics};
use crate::sink::EventSink;
use log::*;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// High-level facade over the connection registry: registration, dispatch,
/// and introspection for the surrounding HTTP layer.
///
/// One instance lives behind an `Arc` for the life of the process and is
/// shared by every handler context. Dispatch never panics and never returns
/// `Result`; outcomes are booleans, counts, and log entries, and a failed
/// write evicts the one connection it belongs to.
pub struct Manager {
    registry: Arc<ConnectionRegistry>,
    heartbeat_started: AtomicBool,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            heartbeat_started: AtomicBool::new(false),
        }
    }

    /// Register a new connection for `client_id` and return its unique id.
    ///
    /// Starts the heartbeat loop on the first call; callers must therefore be
    /// inside a tokio runtime.
    pub fn add_connection(
        &self,
        client_id: impl Into<String>,
        sink: Box<dyn EventSink>,
        name: Option<String>,
    ) -> ConnectionId {
        let client_id = client_id.into();
        let connection_id = self.registry.register(client_id.clone(), sink, name);
        self.ensure_heartbeat();

        info!(
            "client {client_id} connected: {} connection(s) across {} client(s)",
            self.registry.total_connections(),
            self.registry.total_clients()
        );
        connection_id
    }

    /// Remove one connection. No-op if it is already gone.
    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        debug!("unregistering connection {}", connection_id.as_str());
        self.registry.unregister(connection_id);
    }

    /// Tear down every connection a client holds. No-op for unknown clients.
    pub fn remove_client(&self, client_id: &str) {
        debug!("removing all connections for client {client_id}");
        self.registry.remove_client(client_id);
    }

    /// Send one event to every connection a client holds.
    ///
    /// Returns true iff at least one connection received the frame. A client
    /// with no live connections is an expected outcome, not an error.
    pub fn send_to_client(&self, client_id: &str, event_name: &str, payload: &Value) -> bool {
        let targets = self.registry.connection_ids_for(client_id);
        if targets.is_empty() {
            warn!("no live connections for client {client_id}, dropping event {event_name}");
            return false;
        }

        let frame = Frame::new(event_name, payload);
        let delivered = self.deliver_all(&targets, &frame);

        info!(
            "sent {event_name} to client {client_id}: {delivered}/{} connection(s)",
            targets.len()
        );
        delivered > 0
    }

    /// Send one event to every connection of every registered client.
    ///
    /// Returns the number of connections (not clients) that received it.
    pub fn broadcast(&self, event_name: &str, payload: &Value) -> usize {
        let targets = self.registry.all_connection_ids();
        let frame = Frame::new(event_name, payload);
        let delivered = self.deliver_all(&targets, &frame);

        info!(
            "broadcast {event_name}: {delivered}/{} connection(s)",
            targets.len()
        );
        delivered
    }

    /// Write one frame to each target. Per-connection isolation: a failed
    /// write evicts that connection and the sweep continues.
    fn deliver_all(&self, targets: &[ConnectionId], frame: &Frame) -> usize {
        targets
            .iter()
            .filter(|connection_id| self.registry.deliver(connection_id, frame) == Delivery::Delivered)
            .count()
    }

    pub fn has_client_connections(&self, client_id: &str) -> bool {
        self.registry.has_client(client_id)
    }

    pub fn connected_client_ids(&self) -> Vec<String> {
        self.registry.client_ids()
    }

    pub fn client_details(&self) -> Vec<ClientDetails> {
        self.registry.client_details()
    }

    pub fn total_connections(&self) -> usize {
        self.registry.total_connections()
    }

    pub fn connection_metrics(&self) -> ConnectionMetrics {
        ConnectionMetrics::compute(
            self.registry.total_connections(),
            self.registry.total_clients(),
        )
    }

    /// See [`metrics::generate_client_id`].
    pub fn generate_client_id(&self) -> String {
        metrics::generate_client_id()
    }

    /// Queue the confirmation frame on one freshly added connection.
    pub(crate) fn confirm_connection(
        &self,
        client_id: &str,
        connection_id: &ConnectionId,
        name: Option<&str>,
    ) {
        let frame = message::connected_frame(client_id, name);
        self.registry.deliver(connection_id, &frame);
    }

    /// Spawn the heartbeat loop exactly once per process.
    fn ensure_heartbeat(&self) {
        if self.heartbeat_started.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            "starting heartbeat loop with {:?} period",
            heartbeat::HEARTBEAT_INTERVAL
        );
        tokio::spawn(heartbeat::run(Arc::clone(&self.registry)));
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::RecordingSink;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_to_unknown_client_returns_false_without_side_effects() {
        let manager = Manager::new();

        assert!(!manager.send_to_client("ghost", "alert", &json!({"msg": "x"})));
        assert_eq!(manager.total_connections(), 0);
        assert!(manager.connected_client_ids().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_client_reaches_every_connection() {
        let manager = Manager::new();
        let sink1 = RecordingSink::new();
        let sink2 = RecordingSink::new();

        manager.add_connection("a", Box::new(Arc::clone(&sink1)), None);
        manager.add_connection("a", Box::new(Arc::clone(&sink2)), None);

        assert!(manager.send_to_client("a", "alert", &json!({"msg": "x"})));
        for sink in [&sink1, &sink2] {
            assert_eq!(
                sink.wire_frames(),
                vec!["event: alert\ndata: {\"msg\":\"x\"}\n\n".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_send_survives_partial_write_failure() {
        let manager = Manager::new();
        let healthy = RecordingSink::new();
        let dead = RecordingSink::failing();

        manager.add_connection("a", Box::new(Arc::clone(&healthy)), None);
        manager.add_connection("a", Box::new(Arc::clone(&dead)), None);

        // The dead connection is evicted; delivery to the healthy one is
        // unaffected and the client stays registered.
        assert!(manager.send_to_client("a", "alert", &json!({"n": 1})));
        assert!(manager.has_client_connections("a"));
        assert_eq!(manager.total_connections(), 1);

        assert!(manager.send_to_client("a", "alert", &json!({"n": 2})));
        assert_eq!(healthy.frame_count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_counts_connections_not_clients() {
        let manager = Manager::new();
        let sinks: Vec<_> = (0..4).map(|_| RecordingSink::new()).collect();

        manager.add_connection("a", Box::new(Arc::clone(&sinks[0])), None);
        manager.add_connection("b", Box::new(Arc::clone(&sinks[1])), None);
        manager.add_connection("b", Box::new(Arc::clone(&sinks[2])), None);
        manager.add_connection("c", Box::new(Arc::clone(&sinks[3])), None);

        assert_eq!(manager.broadcast("alert", &json!({"msg": "x"})), 4);
        for sink in &sinks {
            assert_eq!(
                sink.wire_frames(),
                vec!["event: alert\ndata: {\"msg\":\"x\"}\n\n".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn test_broadcast_counts_only_successful_deliveries() {
        let manager = Manager::new();
        let healthy = RecordingSink::new();
        let dead = RecordingSink::failing();

        manager.add_connection("a", Box::new(Arc::clone(&healthy)), None);
        manager.add_connection("b", Box::new(Arc::clone(&dead)), None);

        assert_eq!(manager.broadcast("alert", &json!({})), 1);
        assert!(manager.has_client_connections("a"));
        assert!(!manager.has_client_connections("b"));
    }

    #[tokio::test]
    async fn test_remove_client_tears_down_every_connection() {
        let manager = Manager::new();
        let sink1 = RecordingSink::new();
        let sink2 = RecordingSink::new();

        manager.add_connection("a", Box::new(Arc::clone(&sink1)), None);
        manager.add_connection("a", Box::new(Arc::clone(&sink2)), None);

        manager.remove_client("a");
        assert!(!manager.has_client_connections("a"));
        assert_eq!(manager.total_connections(), 0);
        assert_eq!(sink1.close_count(), 1);
        assert_eq!(sink2.close_count(), 1);
    }

    #[tokio::test]
    async fn test_metrics_track_totals_and_average() {
        let manager = Manager::new();

        let empty = manager.connection_metrics();
        assert_eq!(empty.total_connections, 0);
        assert_eq!(empty.total_clients, 0);
        assert_eq!(empty.average_connections_per_client, 0.0);

        manager.add_connection("a", Box::new(RecordingSink::new()), None);
        manager.add_connection("a", Box::new(RecordingSink::new()), None);
        manager.add_connection("b", Box::new(RecordingSink::new()), None);

        let metrics = manager.connection_metrics();
        assert_eq!(metrics.total_connections, 3);
        assert_eq!(metrics.total_clients, 2);
        assert_eq!(metrics.average_connections_per_client, 1.5);
        assert_eq!(
            metrics.total_clients,
            manager.connected_client_ids().len()
        );
    }
}
