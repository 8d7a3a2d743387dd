//! The client registry: a thread-safe mapping from client identity to the
//! set of live connections currently serving that identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Opaque identifier assigned to a connection when it is registered.
/// Distinct from any transport-level identifier; used only to give the
/// registry a hashable, comparable key per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Allocates a new, process-unique connection id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registry of live connections, keyed first by client identity and then
/// by connection id. `Handle` is the sender-side handle a broadcaster uses
/// to push a frame to one connection (e.g. a channel sender); it is kept
/// generic so this crate does not depend on any particular transport.
#[derive(Debug)]
pub struct ClientRegistry<Handle> {
    by_client: Mutex<HashMap<String, HashMap<ConnectionId, Handle>>>,
}

impl<Handle> Default for ClientRegistry<Handle> {
    fn default() -> Self {
        Self {
            by_client: Mutex::new(HashMap::new()),
        }
    }
}

impl<Handle: Clone> ClientRegistry<Handle> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `client_id`. Registering the same
    /// `(client_id, id)` pair twice overwrites the handle and keeps set
    /// cardinality at one.
    pub fn register(&self, client_id: &str, id: ConnectionId, handle: Handle) {
        let mut by_client = self.by_client.lock().expect("registry lock poisoned");
        let _ = by_client.entry(client_id.to_string()).or_default().insert(id, handle);
        tracing::trace!(client_id, connection_id = ?id, "connection registered");
    }

    /// Removes a connection from `client_id`. Removes the client entry
    /// entirely once its last connection is gone.
    pub fn unregister(&self, client_id: &str, id: ConnectionId) {
        let mut by_client = self.by_client.lock().expect("registry lock poisoned");
        if let Some(connections) = by_client.get_mut(client_id) {
            let _ = connections.remove(&id);
            if connections.is_empty() {
                let _ = by_client.remove(client_id);
            }
        }
        tracing::trace!(client_id, connection_id = ?id, "connection unregistered");
    }

    /// Returns a snapshot of every connection handle currently registered
    /// for `client_id`. The snapshot is a consistent point-in-time copy: a
    /// concurrent register/unregister cannot corrupt an in-flight
    /// broadcast iterating this result.
    pub fn connections_of(&self, client_id: &str) -> Vec<Handle> {
        let by_client = self.by_client.lock().expect("registry lock poisoned");
        by_client
            .get(client_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct clients with at least one live connection.
    pub fn client_count(&self) -> usize {
        self.by_client.lock().expect("registry lock poisoned").len()
    }
}
