//! # shipcast-store
//!
//! The persistent shipment store as seen by the relay: an existence check
//! and a newest-first history read behind the [`ShipmentStore`] trait.
//!
//! Two backends ship here. [`MemoryShipmentStore`] serves tests and local
//! runs; [`SqliteShipmentStore`] backs the relay binary. Both also expose
//! `register_shipment` / `record_update` for producers in the same process.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use errors::{Result, StoreError};
pub use memory::MemoryShipmentStore;
pub use sqlite::SqliteShipmentStore;
pub use traits::{NewUpdate, ShipmentStore};
