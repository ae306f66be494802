//! Runtime configuration for the relay server.

use std::time::Duration;

use shipcast_settings::{CacheSettings, ServerSettings};

/// Listener and per-connection limits.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many live connections get HTTP 503.
    pub max_connections: usize,
    /// Bounded outbound queue length per connection.
    pub outbound_queue_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// A client silent for longer than this is disconnected.
    pub heartbeat_timeout: Duration,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            outbound_queue_capacity: 256,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_message_size: 64 * 1024,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            outbound_queue_capacity: s.outbound_queue_capacity,
            heartbeat_interval: Duration::from_secs(s.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(s.heartbeat_timeout_secs),
            max_message_size: s.max_message_size,
        }
    }
}

/// Update cache and janitor tuning.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Most updates kept per shipment.
    pub max_updates: usize,
    /// Entries refreshed within this window skip the store.
    pub freshness_window: Duration,
    /// Entries idle longer than this are evicted.
    pub inactivity_threshold: Duration,
    /// Time between janitor sweeps.
    pub janitor_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_updates: 20,
            freshness_window: Duration::from_secs(60),
            inactivity_threshold: Duration::from_secs(60 * 60),
            janitor_interval: Duration::from_secs(15 * 60),
        }
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(s: &CacheSettings) -> Self {
        Self {
            max_updates: s.max_updates_per_shipment,
            freshness_window: s.freshness_window(),
            inactivity_threshold: s.inactivity_threshold(),
            janitor_interval: s.janitor_interval(),
        }
    }
}
