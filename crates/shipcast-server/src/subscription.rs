//! Reverse index from shipment to subscribed connections.
//!
//! Not synchronized on its own: the registry mutates it under the same lock
//! as the per-connection subscription sets so the two never disagree.

use std::collections::{HashMap, HashSet};

use shipcast_core::{ConnectionId, ShipmentId};

/// `shipment -> {connection}` map. Empty sets are never stored.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    by_shipment: HashMap<ShipmentId, HashSet<ConnectionId>>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `shipment`. Returns `false` if it was already there.
    pub fn subscribe(&mut self, conn: &ConnectionId, shipment: ShipmentId) -> bool {
        self.by_shipment
            .entry(shipment)
            .or_default()
            .insert(conn.clone())
    }

    /// Remove `conn` from `shipment`. Returns `false` if it was not there.
    pub fn unsubscribe(&mut self, conn: &ConnectionId, shipment: ShipmentId) -> bool {
        let Some(subscribers) = self.by_shipment.get_mut(&shipment) else {
            return false;
        };
        let removed = subscribers.remove(conn);
        if subscribers.is_empty() {
            let _ = self.by_shipment.remove(&shipment);
        }
        removed
    }

    /// Remove `conn` from each of `shipments`.
    pub fn remove_connection<I>(&mut self, conn: &ConnectionId, shipments: I)
    where
        I: IntoIterator<Item = ShipmentId>,
    {
        for shipment in shipments {
            let _ = self.unsubscribe(conn, shipment);
        }
    }

    /// Snapshot of the connections subscribed to `shipment`.
    pub fn subscribers_of(&self, shipment: ShipmentId) -> Vec<ConnectionId> {
        self.by_shipment
            .get(&shipment)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `conn` is subscribed to `shipment`.
    pub fn contains(&self, conn: &ConnectionId, shipment: ShipmentId) -> bool {
        self.by_shipment
            .get(&shipment)
            .is_some_and(|set| set.contains(conn))
    }

    /// Number of shipments with at least one subscriber.
    pub fn shipment_count(&self) -> usize {
        self.by_shipment.len()
    }

    /// Total `(connection, shipment)` pairs.
    pub fn subscription_count(&self) -> usize {
        self.by_shipment.values().map(HashSet::len).sum()
    }

    /// Every shipment `conn` appears under. Linear scan; used by tests and
    /// consistency checks.
    pub fn shipments_of(&self, conn: &ConnectionId) -> HashSet<ShipmentId> {
        self.by_shipment
            .iter()
            .filter(|(_, set)| set.contains(conn))
            .map(|(shipment, _)| *shipment)
            .collect()
    }
}
