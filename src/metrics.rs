use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;

/// Aggregate connection counts, shaped for the admin surface to return as
/// JSON verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetrics {
    pub total_connections: usize,
    pub total_clients: usize,
    pub average_connections_per_client: f64,
}

impl ConnectionMetrics {
    /// Average is rounded to two decimal places and defined as 0 when no
    /// clients are registered.
    pub(crate) fn compute(total_connections: usize, total_clients: usize) -> Self {
        let average_connections_per_client = if total_clients == 0 {
            0.0
        } else {
            let raw = total_connections as f64 / total_clients as f64;
            (raw * 100.0).round() / 100.0
        };

        Self {
            total_connections,
            total_clients,
            average_connections_per_client,
        }
    }
}

/// Per-client view over the registry: one entry per client with at least one
/// live connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetails {
    pub id: String,
    pub name: Option<String>,
    pub connection_count: usize,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Produce a fresh opaque client identifier: millisecond-timestamp prefix
/// plus a random alphanumeric suffix.
///
/// Collision-resistant for the life of the process; no global uniqueness
/// guarantee.
pub fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("client_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metrics_with_no_clients_are_all_zero() {
        let metrics = ConnectionMetrics::compute(0, 0);
        assert_eq!(metrics.total_connections, 0);
        assert_eq!(metrics.total_clients, 0);
        assert_eq!(metrics.average_connections_per_client, 0.0);
    }

    #[test]
    fn test_average_rounds_to_two_decimal_places() {
        assert_eq!(ConnectionMetrics::compute(3, 2).average_connections_per_client, 1.5);
        assert_eq!(ConnectionMetrics::compute(4, 3).average_connections_per_client, 1.33);
        assert_eq!(ConnectionMetrics::compute(5, 3).average_connections_per_client, 1.67);
    }

    #[test]
    fn test_metrics_serialize_with_camel_case_keys() {
        let value = serde_json::to_value(ConnectionMetrics::compute(4, 2)).unwrap();
        assert_eq!(value["totalConnections"], 4);
        assert_eq!(value["totalClients"], 2);
        assert_eq!(value["averageConnectionsPerClient"], 2.0);
    }

    #[test]
    fn test_client_details_serialize_with_camel_case_keys() {
        let details = ClientDetails {
            id: "client_1".to_string(),
            name: Some("Ada".to_string()),
            connection_count: 2,
            connected_at: Utc::now(),
            last_seen: Utc::now(),
        };

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["id"], "client_1");
        assert_eq!(value["connectionCount"], 2);
        assert!(value["connectedAt"].is_string());
        assert!(value["lastSeen"].is_string());
    }

    #[test]
    fn test_generated_client_ids_have_expected_shape() {
        let id = generate_client_id();
        assert!(id.starts_with("client_"));

        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let ids: HashSet<String> = (0..100).map(|_| generate_client_id()).collect();
        assert_eq!(ids.len(), 100);
    }
}
