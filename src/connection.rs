use crate::message::Frame;
use crate::metrics::ClientDetails;
use crate::sink::EventSink;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Opaque client identity. One client may hold many concurrent connections.
pub type ClientId = String;

/// Unique identifier for a single connection (server-generated).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// One live streaming connection: the client it belongs to, the sink it
/// exclusively owns, and its liveness timestamps.
pub struct Connection {
    client_id: ClientId,
    name: Option<String>,
    sink: Box<dyn EventSink>,
    connected_at: DateTime<Utc>,
    /// Unix milliseconds, refreshed on every successful write. Kept atomic so
    /// readers of the registry observe updates without taking a lock.
    last_seen: AtomicI64,
}

impl Connection {
    fn new(client_id: ClientId, sink: Box<dyn EventSink>, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            name,
            sink,
            connected_at: now,
            last_seen: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        let millis = self.last_seen.load(Ordering::Relaxed);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn touch(&self) {
        self.last_seen
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("connected_at", &self.connected_at)
            .field("last_seen", &self.last_seen)
            .finish_non_exhaustive()
    }
}

/// Outcome of writing one frame to one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Frame written; the connection's `last_seen` was refreshed.
    Delivered,
    /// Write failed; the connection was removed and its sink closed.
    Evicted,
    /// The connection was already gone when the write was attempted.
    Gone,
}

/// Registry of live connections with dual indices for O(1) lookups.
///
/// Invariant: every key in `client_index` maps to a non-empty set; the key is
/// removed together with the client's last connection.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection id for delivery and cleanup.
    connections: DashMap<ConnectionId, Connection>,

    /// Secondary index: client id to the ids of that client's connections.
    client_index: DashMap<ClientId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            client_index: DashMap::new(),
        }
    }

    /// Register a new connection. Infallible; stamps `connected_at` and
    /// `last_seen` with the current time.
    pub fn register(
        &self,
        client_id: ClientId,
        sink: Box<dyn EventSink>,
        name: Option<String>,
    ) -> ConnectionId {
        let connection_id = ConnectionId::new();

        self.connections.insert(
            connection_id.clone(),
            Connection::new(client_id.clone(), sink, name),
        );

        self.client_index
            .entry(client_id)
            .or_default()
            .insert(connection_id.clone());

        connection_id
    }

    /// Remove one connection, closing its sink best-effort. No-op for unknown
    /// ids. Deletes the client key if this was the client's last connection.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(connection_id) {
            if let Some(mut ids) = self.client_index.get_mut(connection.client_id()) {
                ids.remove(connection_id);
                if ids.is_empty() {
                    drop(ids); // release the shard lock before removal
                    self.client_index
                        .remove_if(connection.client_id(), |_, ids| ids.is_empty());
                }
            }
            connection.sink.close();
        }
    }

    /// Remove every connection belonging to `client_id`, closing each sink.
    /// No-op for unknown clients.
    pub fn remove_client(&self, client_id: &str) {
        if let Some((_, ids)) = self.client_index.remove(client_id) {
            for connection_id in ids {
                if let Some((_, connection)) = self.connections.remove(&connection_id) {
                    connection.sink.close();
                }
            }
        }
    }

    /// True iff the client holds at least one live connection.
    pub fn has_client(&self, client_id: &str) -> bool {
        self.client_index
            .get(client_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// All currently registered client identities, order unspecified.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.client_index
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot of one client's connection ids, detached from the index so
    /// callers can write (and evict) without holding a shard lock.
    pub(crate) fn connection_ids_for(&self, client_id: &str) -> Vec<ConnectionId> {
        self.client_index
            .get(client_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every registered connection id.
    pub(crate) fn all_connection_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn total_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn total_clients(&self) -> usize {
        self.client_index.len()
    }

    /// Write one frame to one connection.
    ///
    /// The shard guard is released before any eviction so a failed write can
    /// remove the entry without deadlocking against the map it came from.
    pub(crate) fn deliver(&self, connection_id: &ConnectionId, frame: &Frame) -> Delivery {
        let outcome = match self.connections.get(connection_id) {
            Some(connection) => match connection.sink.write(frame) {
                Ok(()) => {
                    connection.touch();
                    Delivery::Delivered
                }
                Err(e) => {
                    warn!(
                        "write to connection {} failed: {e}; evicting",
                        connection_id.as_str()
                    );
                    Delivery::Evicted
                }
            },
            None => Delivery::Gone,
        };

        if outcome == Delivery::Evicted {
            self.unregister(connection_id);
        }

        outcome
    }

    /// One read-model entry per live client, most recently connected first.
    ///
    /// `name` and `connected_at` come from an arbitrary member of the
    /// client's connection set; `last_seen` is the freshest across the set.
    pub fn client_details(&self) -> Vec<ClientDetails> {
        let mut details: Vec<ClientDetails> = Vec::new();

        for entry in self.client_index.iter() {
            let mut name = None;
            let mut connected_at: Option<DateTime<Utc>> = None;
            let mut last_seen: Option<DateTime<Utc>> = None;
            let mut connection_count = 0;

            for connection_id in entry.value() {
                if let Some(connection) = self.connections.get(connection_id) {
                    connection_count += 1;
                    if connected_at.is_none() {
                        name = connection.name.clone();
                        connected_at = Some(connection.connected_at);
                    }
                    let seen = connection.last_seen();
                    if last_seen.map(|prev| seen > prev).unwrap_or(true) {
                        last_seen = Some(seen);
                    }
                }
            }

            if let (Some(connected_at), Some(last_seen)) = (connected_at, last_seen) {
                details.push(ClientDetails {
                    id: entry.key().clone(),
                    name,
                    connection_count,
                    connected_at,
                    last_seen,
                });
            }
        }

        details.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        details
    }

    #[cfg(test)]
    pub(crate) fn set_last_seen(&self, connection_id: &ConnectionId, millis: i64) {
        self.connections
            .get(connection_id)
            .unwrap()
            .last_seen
            .store(millis, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn last_seen_millis(&self, connection_id: &ConnectionId) -> i64 {
        self.connections
            .get(connection_id)
            .unwrap()
            .last_seen()
            .timestamp_millis()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
