//! Store error types.

use shipcast_core::{RelayError, ShipmentId};
use thiserror::Error;

/// Errors from shipment store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A write referenced a shipment that was never registered.
    #[error("Shipment {0} is not registered")]
    UnknownShipment(ShipmentId),

    /// The store is temporarily unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        RelayError::internal(e.to_string())
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
