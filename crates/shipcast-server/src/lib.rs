//! # shipcast-server
//!
//! Real-time shipment-tracking relay over Axum WebSockets.
//!
//! - Connection registry and reverse subscription index behind one lock
//! - Per-shipment update cache with store read-through and a janitor task
//! - Inbound message routing (subscribe, unsubscribe) with ack/error replies
//! - Broadcaster API for producers: single updates and grouped batches
//! - HTTP endpoints: `/ws`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod broadcaster;
pub mod cache;
pub mod config;
pub mod health;
pub mod janitor;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod subscription;
pub mod websocket;

pub use auth::AuthGate;
pub use broadcaster::{BroadcastItem, Broadcaster};
pub use config::{CacheConfig, ServerConfig};
pub use relay::{RelayStats, TrackingRelay};
pub use server::ShipcastServer;
