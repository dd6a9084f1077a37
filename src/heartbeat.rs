use crate::connection::{ConnectionRegistry, Delivery};
use crate::message;
use log::*;
use std::sync::Arc;
use std::time::Duration;

/// Probe period. Also the upper bound on how long a connection whose peer
/// vanished without unregistering survives before a failed probe reclaims it.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Run the probe loop for the life of the process. Spawned at most once,
/// lazily when the first connection is registered.
pub(crate) async fn run(registry: Arc<ConnectionRegistry>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // The first tick completes immediately; consume it so probing starts one
    // full period after startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(&registry);
    }
}

/// One probe pass over a snapshot of every connection: write a heartbeat
/// frame, refresh `last_seen` on success, evict on failure.
///
/// Returns the number of connections evicted this pass.
pub(crate) fn sweep(registry: &ConnectionRegistry) -> usize {
    let frame = message::heartbeat_frame();
    let mut dead = 0;

    for connection_id in registry.all_connection_ids() {
        if registry.deliver(&connection_id, &frame) == Delivery::Evicted {
            dead += 1;
        }
    }

    if dead > 0 {
        info!(
            "heartbeat reaped {dead} dead connection(s), {} remaining",
            registry.total_connections()
        );
    }

    dead
}
