//! Fan-out of one payload to every registered connection.

use std::sync::Arc;

use super::handle::Outbound;
use super::registry::ConnectionRegistry;

/// Result of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the payload was queued for.
    pub delivered: usize,
    /// Connections that refused it and were closed and deregistered.
    pub pruned: usize,
}

/// Delivers payloads to every connection in a [`ConnectionRegistry`].
///
/// Each delivery is an independent non-blocking queue push. A connection that
/// refuses (closed, or its queue is full) is closed and removed in the same
/// pass; the remaining connections are unaffected.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Queues `payload` as a text frame on every registered connection.
    pub fn broadcast(&self, payload: &str) -> BroadcastReport {
        let frame: Arc<str> = Arc::from(payload);
        let mut report = BroadcastReport::default();

        self.registry.for_each(|conn| {
            match conn.try_deliver(Outbound::Text(Arc::clone(&frame))) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        conn_id = %conn.id(),
                        error_kind = e.kind(),
                        error = %e,
                        "failed to send message to client"
                    );
                    conn.close();
                    if self.registry.remove(&conn.id()).is_some() {
                        report.pruned += 1;
                    }
                }
            }
        });

        tracing::debug!(
            delivered = report.delivered,
            pruned = report.pruned,
            "broadcast complete"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ws::handle::ConnectionHandle;
    use tokio::sync::mpsc;

    fn connect(registry: &ConnectionRegistry) -> (Arc<ConnectionHandle>, mpsc::Receiver<Outbound>) {
        let (handle, rx) = ConnectionHandle::new(8);
        let handle = Arc::new(handle);
        registry.add(Arc::clone(&handle));
        (handle, rx)
    }

    fn text(rx: &mut mpsc::Receiver<Outbound>) -> Option<String> {
        match rx.try_recv() {
            Ok(Outbound::Text(t)) => Some(t.to_string()),
            _ => None,
        }
    }

    #[test]
    fn failed_connection_is_pruned_between_broadcasts() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (a, mut a_rx) = connect(&registry);
        let (b, mut b_rx) = connect(&registry);

        let report = broadcaster.broadcast("hello");
        assert_eq!(report, BroadcastReport { delivered: 2, pruned: 0 });
        assert_eq!(text(&mut a_rx).as_deref(), Some("hello"));
        assert_eq!(text(&mut b_rx).as_deref(), Some("hello"));

        // A's writer goes away, so its next write fails.
        drop(a_rx);
        let report = broadcaster.broadcast("world");
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert!(!registry.contains(&a.id()));
        assert!(registry.contains(&b.id()));
        assert!(a.is_closed());
        assert_eq!(text(&mut b_rx).as_deref(), Some("world"));
    }

    #[test]
    fn only_the_failing_connection_is_removed() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let mut conns: Vec<_> = (0..5).map(|_| connect(&registry)).collect();

        let Some((failing, failing_rx)) = conns.get_mut(2) else {
            panic!("five connections");
        };
        let failing_id = failing.id();
        failing_rx.close();

        let report = broadcaster.broadcast("ping");
        assert_eq!(report, BroadcastReport { delivered: 4, pruned: 1 });
        assert_eq!(registry.len(), 4);
        assert!(!registry.contains(&failing_id));

        for (handle, rx) in &mut conns {
            if handle.id() != failing_id {
                assert_eq!(text(rx).as_deref(), Some("ping"));
            }
        }
    }

    #[test]
    fn slow_connection_is_disconnected_not_awaited() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (slow, _slow_rx) = {
            let (handle, rx) = ConnectionHandle::new(1);
            let handle = Arc::new(handle);
            registry.add(Arc::clone(&handle));
            (handle, rx)
        };
        let (_fast, mut fast_rx) = connect(&registry);

        assert_eq!(broadcaster.broadcast("one").delivered, 2);
        let report = broadcaster.broadcast("two");
        assert_eq!(report, BroadcastReport { delivered: 1, pruned: 1 });
        assert!(slow.is_closed());
        assert_eq!(text(&mut fast_rx).as_deref(), Some("one"));
        assert_eq!(text(&mut fast_rx).as_deref(), Some("two"));
    }

    #[test]
    fn empty_registry_delivers_nothing() {
        let broadcaster = Broadcaster::new(Arc::new(ConnectionRegistry::new()));
        assert_eq!(broadcaster.broadcast("hello"), BroadcastReport::default());
    }
}
