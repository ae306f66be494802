//! Fan-out of shipment updates to subscribed connections.

use std::sync::Arc;

use metrics::counter;
use shipcast_core::{GeoLocation, Message, ShipmentId, ShipmentUpdate};
use tracing::{debug, warn};

use crate::cache::UpdateCache;
use crate::metrics::{BROADCAST_MESSAGES_TOTAL, BROADCAST_SEND_FAILURES_TOTAL};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::Connection;

/// One entry of a [`Broadcaster::send_batch_updates`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum BroadcastItem {
    /// A new update record.
    Update {
        /// Target shipment.
        shipment_id: ShipmentId,
        /// The record.
        update: ShipmentUpdate,
    },
    /// A status transition.
    StatusChange {
        /// Target shipment.
        shipment_id: ShipmentId,
        /// Status before.
        previous_status: String,
        /// Status after.
        new_status: String,
        /// Transition description.
        description: String,
    },
    /// A geolocation ping.
    Location {
        /// Target shipment.
        shipment_id: ShipmentId,
        /// Reported position.
        location: GeoLocation,
    },
}

impl BroadcastItem {
    /// Shipment this item belongs to.
    pub fn shipment_id(&self) -> ShipmentId {
        match self {
            Self::Update { shipment_id, .. }
            | Self::StatusChange { shipment_id, .. }
            | Self::Location { shipment_id, .. } => *shipment_id,
        }
    }

    /// Wire message for this item.
    pub fn into_message(self) -> Message {
        match self {
            Self::Update {
                shipment_id,
                update,
            } => Message::update(shipment_id, update),
            Self::StatusChange {
                shipment_id,
                previous_status,
                new_status,
                description,
            } => Message::status_change(shipment_id, previous_status, new_status, description),
            Self::Location {
                shipment_id,
                location,
            } => Message::location_update(shipment_id, location),
        }
    }
}

/// Pushes update messages to every subscriber of a shipment and records
/// them in the cache.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    cache: Arc<UpdateCache>,
}

impl Broadcaster {
    /// Broadcaster over the shared registry and cache.
    pub fn new(registry: Arc<ConnectionRegistry>, cache: Arc<UpdateCache>) -> Self {
        Self { registry, cache }
    }

    /// Broadcast a `shipment_update`. Returns the number of connections reached.
    pub fn broadcast_update(&self, shipment_id: ShipmentId, update: ShipmentUpdate) -> usize {
        self.publish(shipment_id, Message::update(shipment_id, update))
    }

    /// Broadcast a `shipment_status_change`.
    pub fn broadcast_status_change(
        &self,
        shipment_id: ShipmentId,
        previous_status: impl Into<String>,
        new_status: impl Into<String>,
        description: impl Into<String>,
    ) -> usize {
        let msg = Message::status_change(shipment_id, previous_status, new_status, description);
        self.publish(shipment_id, msg)
    }

    /// Broadcast a `shipment_location_update`.
    pub fn broadcast_location_update(
        &self,
        shipment_id: ShipmentId,
        location: GeoLocation,
    ) -> usize {
        self.publish(shipment_id, Message::location_update(shipment_id, location))
    }

    /// Group `items` by shipment and send one `batch_update` per shipment,
    /// in first-seen order. Items inside a batch keep their input order.
    /// Returns the total number of deliveries.
    pub fn send_batch_updates(&self, items: Vec<BroadcastItem>) -> usize {
        let mut groups: Vec<(ShipmentId, Vec<Message>)> = Vec::new();
        for item in items {
            let shipment = item.shipment_id();
            let msg = item.into_message();
            match groups.iter_mut().find(|(s, _)| *s == shipment) {
                Some((_, msgs)) => msgs.push(msg),
                None => groups.push((shipment, vec![msg])),
            }
        }

        let mut reached = 0;
        for (shipment, msgs) in groups {
            let subscribers = self.registry.subscribers_of(shipment);
            if subscribers.is_empty() {
                debug!(%shipment, items = msgs.len(), "batch has no subscribers");
                continue;
            }
            let batch = Message::batch(msgs.clone());
            reached += Self::deliver(shipment, &batch, &subscribers);
            for msg in msgs {
                self.cache.push(shipment, msg);
            }
        }
        reached
    }

    fn publish(&self, shipment: ShipmentId, msg: Message) -> usize {
        let subscribers = self.registry.subscribers_of(shipment);
        if subscribers.is_empty() {
            debug!(%shipment, kind = msg.kind.type_name(), "no subscribers");
            return 0;
        }
        let reached = Self::deliver(shipment, &msg, &subscribers);
        self.cache.push(shipment, msg);
        reached
    }

    fn deliver(shipment: ShipmentId, msg: &Message, subscribers: &[Arc<Connection>]) -> usize {
        let frame = match msg.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(%shipment, kind = msg.kind.type_name(), error = %e, "failed to serialize broadcast");
                return 0;
            }
        };

        let mut reached = 0;
        for conn in subscribers.iter().filter(|c| c.is_open()) {
            if conn.send(Arc::clone(&frame)) {
                reached += 1;
            } else {
                counter!(BROADCAST_SEND_FAILURES_TOTAL).increment(1);
                warn!(conn_id = %conn.id, %shipment, "failed to queue broadcast (queue full or closed)");
            }
        }
        counter!(BROADCAST_MESSAGES_TOTAL, "kind" => msg.kind.type_name()).increment(reached as u64);
        debug!(
            %shipment,
            kind = msg.kind.type_name(),
            recipients = subscribers.len(),
            reached,
            "broadcast"
        );
        reached
    }
}
