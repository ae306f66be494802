//! The store seam the relay reads through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipcast_core::{ShipmentId, ShipmentUpdate};

use crate::errors::Result;

/// Read-only view of persisted shipments.
///
/// The relay only ever asks two questions: does a shipment exist, and what
/// happened to it recently.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Whether `shipment_id` refers to a known shipment.
    async fn shipment_exists(&self, shipment_id: ShipmentId) -> Result<bool>;

    /// Up to `limit` most recent updates for `shipment_id`, newest first.
    async fn fetch_recent_updates(
        &self,
        shipment_id: ShipmentId,
        limit: usize,
    ) -> Result<Vec<ShipmentUpdate>>;
}

/// An update as submitted by a producer, before the store assigns an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUpdate {
    /// Status label.
    pub status: String,
    /// Free-text description.
    pub description: String,
    /// Optional location name.
    pub location: Option<String>,
    /// When the update happened.
    pub timestamp: DateTime<Utc>,
}

impl NewUpdate {
    /// An update stamped with the current time and no location.
    pub fn now(status: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            description: description.into(),
            location: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a location name.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub(crate) fn into_update(self, id: i64) -> ShipmentUpdate {
        ShipmentUpdate {
            id,
            status: self.status,
            description: self.description,
            timestamp: self.timestamp,
            location: self.location,
        }
    }
}
