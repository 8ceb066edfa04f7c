//! Periodic keepalive for one connection.
//!
//! The heartbeat is not spawned: it runs as one branch of the connection
//! task's `select!`, so it stops exactly when the connection does.

use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use super::handle::{ConnectionHandle, Outbound};

/// Queues a ping on `handle` every `interval` until the connection closes or
/// a ping cannot be queued. The first ping is sent one interval after start.
pub async fn run_heartbeat(handle: &ConnectionHandle, interval: Duration) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = handle.closed() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = handle.try_deliver(Outbound::Ping) {
            tracing::debug!(conn_id = %handle.id(), error = %e, "heartbeat failed, closing connection");
            handle.close();
            break;
        }
    }

    tracing::debug!(conn_id = %handle.id(), "heartbeat stopped");
}
