//! Concurrent registry of open connections.
//!
//! [`ConnectionRegistry`] is shared by every connection task and by the
//! broker consumer. It is backed by a [`DashMap`], so registration,
//! deregistration, and enumeration from different tasks never race. An entry
//! is either fully present or fully absent.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::handle::ConnectionHandle;
use crate::domain::ConnectionId;

/// Set of currently open connections, keyed by [`ConnectionId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. Returns `false` (and changes nothing) if a
    /// connection with the same id is already registered.
    pub fn add(&self, handle: Arc<ConnectionHandle>) -> bool {
        match self.connections.entry(handle.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    /// Deregisters a connection, returning its handle if it was present.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(id).map(|(_, handle)| handle)
    }

    /// Registers `handle` and returns a guard that deregisters it on drop.
    #[must_use = "dropping the registration immediately deregisters the connection"]
    pub fn register(self: &Arc<Self>, handle: Arc<ConnectionHandle>) -> Registration {
        let id = handle.id();
        self.add(handle);
        Registration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Calls `f` once per registered connection, in unspecified order.
    ///
    /// Runs over a snapshot, so `f` may freely call [`Self::add`] or
    /// [`Self::remove`].
    pub fn for_each(&self, mut f: impl FnMut(&Arc<ConnectionHandle>)) {
        for handle in &self.snapshot() {
            f(handle);
        }
    }

    /// Returns the currently registered connections.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Keeps a connection registered for as long as it lives.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Registration {
    /// The registered connection's id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.remove(&self.id).is_some() {
            tracing::debug!(conn_id = %self.id, "connection deregistered");
        }
    }
}
