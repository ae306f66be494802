//! In-memory shipment store for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use shipcast_core::{ShipmentId, ShipmentUpdate};

use crate::errors::{Result, StoreError};
use crate::traits::{NewUpdate, ShipmentStore};

/// `HashMap`-backed store.
///
/// Also counts reads and can be switched offline, so callers can observe
/// caching behaviour and error paths.
#[derive(Debug)]
pub struct MemoryShipmentStore {
    shipments: RwLock<HashMap<ShipmentId, Vec<ShipmentUpdate>>>,
    next_update_id: AtomicI64,
    available: AtomicBool,
    fetches: AtomicUsize,
}

impl Default for MemoryShipmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShipmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shipments: RwLock::new(HashMap::new()),
            next_update_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Make `shipment_id` known. Idempotent.
    pub fn register_shipment(&self, shipment_id: ShipmentId) {
        let _ = self.shipments.write().entry(shipment_id).or_default();
    }

    /// Append an update to a registered shipment.
    pub fn record_update(&self, shipment_id: ShipmentId, update: NewUpdate) -> Result<ShipmentUpdate> {
        self.check_available()?;
        let mut shipments = self.shipments.write();
        let history = shipments
            .get_mut(&shipment_id)
            .ok_or(StoreError::UnknownShipment(shipment_id))?;
        let record = update.into_update(self.next_update_id.fetch_add(1, Ordering::Relaxed));
        history.push(record.clone());
        Ok(record)
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Number of `fetch_recent_updates` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched offline".into()))
        }
    }
}

#[async_trait]
impl ShipmentStore for MemoryShipmentStore {
    async fn shipment_exists(&self, shipment_id: ShipmentId) -> Result<bool> {
        self.check_available()?;
        Ok(self.shipments.read().contains_key(&shipment_id))
    }

    async fn fetch_recent_updates(
        &self,
        shipment_id: ShipmentId,
        limit: usize,
    ) -> Result<Vec<ShipmentUpdate>> {
        self.check_available()?;
        let _ = self.fetches.fetch_add(1, Ordering::Relaxed);
        let shipments = self.shipments.read();
        let Some(history) = shipments.get(&shipment_id) else {
            return Ok(Vec::new());
        };
        let mut updates = history.clone();
        updates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        updates.truncate(limit);
        Ok(updates)
    }
}
