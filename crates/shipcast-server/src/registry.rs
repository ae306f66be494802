//! Live connections and their subscriptions.
//!
//! The connection map, each connection's shipment set, and the reverse
//! [`SubscriptionIndex`] sit behind one mutex, so
//! `conn ∈ index[s] ⇔ s ∈ subscriptions(conn)` holds after every call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use shipcast_core::{ConnectionId, RelayError, ShipmentId};
use tracing::debug;

use crate::subscription::SubscriptionIndex;
use crate::websocket::connection::Connection;

struct Entry {
    conn: Arc<Connection>,
    shipments: HashSet<ShipmentId>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Entry>,
    index: SubscriptionIndex,
}

/// Registry of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` and return its id. Re-adding the same id replaces the
    /// connection but keeps its subscriptions.
    pub fn add(&self, conn: Arc<Connection>) -> ConnectionId {
        let id = conn.id.clone();
        let mut inner = self.inner.lock();
        match inner.connections.get_mut(&id) {
            Some(entry) => entry.conn = conn,
            None => {
                let _ = inner.connections.insert(
                    id.clone(),
                    Entry {
                        conn,
                        shipments: HashSet::new(),
                    },
                );
            }
        }
        debug!(conn_id = %id, total = inner.connections.len(), "connection registered");
        id
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.inner.lock().connections.get(id).map(|e| e.conn.clone())
    }

    /// Remove a connection and every index entry that points at it.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock();
        let entry = inner.connections.remove(id)?;
        inner.index.remove_connection(id, entry.shipments.iter().copied());
        debug!(
            conn_id = %id,
            dropped_subscriptions = entry.shipments.len(),
            "connection removed"
        );
        Some(entry.conn)
    }

    /// Subscribe a registered connection to `shipment`. Idempotent; returns
    /// whether a new subscription was created.
    pub fn subscribe(&self, id: &ConnectionId, shipment: ShipmentId) -> Result<bool, RelayError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let entry = inner
            .connections
            .get_mut(id)
            .ok_or_else(|| RelayError::internal(format!("connection {id} is not registered")))?;
        let added = entry.shipments.insert(shipment);
        let _ = inner.index.subscribe(id, shipment);
        Ok(added)
    }

    /// Unsubscribe. Absent subscriptions and unknown connections are no-ops.
    pub fn unsubscribe(&self, id: &ConnectionId, shipment: ShipmentId) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.connections.get_mut(id) else {
            return false;
        };
        let removed = entry.shipments.remove(&shipment);
        let _ = inner.index.unsubscribe(id, shipment);
        removed
    }

    /// Shipments a connection is subscribed to.
    pub fn subscriptions_of(&self, id: &ConnectionId) -> HashSet<ShipmentId> {
        self.inner
            .lock()
            .connections
            .get(id)
            .map(|e| e.shipments.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the connections subscribed to `shipment`.
    pub fn subscribers_of(&self, shipment: ShipmentId) -> Vec<Arc<Connection>> {
        let inner = self.inner.lock();
        inner
            .index
            .subscribers_of(shipment)
            .iter()
            .filter_map(|id| inner.connections.get(id).map(|e| e.conn.clone()))
            .collect()
    }

    /// Number of registered connections.
    pub fn count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Total `(connection, shipment)` subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().index.subscription_count()
    }

    /// Every registered connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner
            .lock()
            .connections
            .values()
            .map(|e| e.conn.clone())
            .collect()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let inner = self.inner.lock();
        let forward: usize = inner.connections.values().map(|e| e.shipments.len()).sum();
        forward == inner.index.subscription_count()
            && inner
                .connections
                .iter()
                .all(|(id, e)| inner.index.shipments_of(id) == e.shipments)
    }
}
