//! Shipment payload types produced by the fulfillment system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single status update recorded against a shipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentUpdate {
    /// Store-assigned update id.
    pub id: i64,
    /// Status label at the time of the update (e.g. `in_transit`).
    pub status: String,
    /// Free-text description.
    pub description: String,
    /// When the update happened.
    pub timestamp: DateTime<Utc>,
    /// Human-readable location name, if the producer supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A geolocation ping for a shipment in motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Reverse-geocoded address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// When the ping was taken.
    pub timestamp: DateTime<Utc>,
}
