//! # shipcast-core
//!
//! Foundation types shared by every shipcast crate:
//!
//! - **Branded IDs**: `ConnectionId`, `MessageId` as newtypes, `ShipmentId` over `i64`
//! - **Shipment payloads**: `ShipmentUpdate`, `GeoLocation`
//! - **Wire protocol**: `Message` envelope with the closed `MessageKind` sum type
//! - **Errors**: `RelayError` taxonomy mapped to numeric wire codes
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod shipment;

pub use errors::{RelayError, Result};
pub use ids::{ConnectionId, MessageId, ShipmentId};
pub use protocol::{Message, MessageKind};
pub use shipment::{GeoLocation, ShipmentUpdate};
