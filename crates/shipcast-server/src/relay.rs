//! `TrackingRelay`: the service object tying registry, cache, janitor,
//! router, and broadcaster together.

use std::sync::Arc;

use serde::Serialize;
use shipcast_store::ShipmentStore;
use tracing::info;

use crate::auth::AuthGate;
use crate::broadcaster::Broadcaster;
use crate::cache::UpdateCache;
use crate::config::CacheConfig;
use crate::janitor::CacheJanitor;
use crate::registry::ConnectionRegistry;
use crate::router::MessageRouter;

/// Point-in-time relay counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    /// Registered connections.
    pub connections: usize,
    /// `(connection, shipment)` subscriptions.
    pub subscriptions: usize,
    /// Shipments with a cache entry.
    pub cached_shipments: usize,
}

/// Shipment-tracking relay.
///
/// Each instance owns its own registry and cache, so tests can build as
/// many isolated relays as they need.
pub struct TrackingRelay {
    registry: Arc<ConnectionRegistry>,
    cache: Arc<UpdateCache>,
    janitor: Arc<CacheJanitor>,
    broadcaster: Broadcaster,
    router: MessageRouter,
    gate: AuthGate,
    store: Arc<dyn ShipmentStore>,
}

impl TrackingRelay {
    /// Build a relay. The janitor is not started until [`Self::start`].
    pub fn new(store: Arc<dyn ShipmentStore>, gate: AuthGate, cache_config: &CacheConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(UpdateCache::new(cache_config));
        let janitor = Arc::new(CacheJanitor::new(
            cache.clone(),
            cache_config.janitor_interval,
            cache_config.inactivity_threshold,
        ));
        Self {
            broadcaster: Broadcaster::new(registry.clone(), cache.clone()),
            router: MessageRouter::new(registry.clone(), cache.clone(), store.clone()),
            registry,
            cache,
            janitor,
            gate,
            store,
        }
    }

    /// Start background work.
    pub fn start(&self) {
        self.janitor.start();
        info!("tracking relay started");
    }

    /// Stop background work and wait for it.
    pub async fn stop(&self) {
        self.janitor.stop().await;
        info!("tracking relay stopped");
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.registry.count(),
            subscriptions: self.registry.subscription_count(),
            cached_shipments: self.cache.len(),
        }
    }

    /// Producer-facing broadcast API.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Inbound dispatch.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Admission gate.
    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Update cache.
    pub fn cache(&self) -> &Arc<UpdateCache> {
        &self.cache
    }

    /// Cache janitor.
    pub fn janitor(&self) -> &Arc<CacheJanitor> {
        &self.janitor
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn ShipmentStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Connection;
    use shipcast_core::ShipmentId;
    use shipcast_store::MemoryShipmentStore;
    use tokio::sync::mpsc;

    fn relay() -> TrackingRelay {
        TrackingRelay::new(
            Arc::new(MemoryShipmentStore::new()),
            AuthGate::anonymous_only(),
            &CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn stats_track_connections_subscriptions_and_cache() {
        let relay = relay();
        assert_eq!(relay.stats(), RelayStats::default());

        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(Connection::new(tx));
        let id = relay.registry().add(conn.clone());
        let _ = conn.activate();
        let _ = relay.registry().subscribe(&id, ShipmentId::new(1)).unwrap();
        let _ = relay
            .broadcaster()
            .broadcast_status_change(ShipmentId::new(1), "pending", "in_transit", "left depot");

        assert_eq!(
            relay.stats(),
            RelayStats {
                connections: 1,
                subscriptions: 1,
                cached_shipments: 1,
            }
        );
    }

    #[tokio::test]
    async fn relays_are_isolated() {
        let a = relay();
        let b = relay();
        let (tx, _rx) = mpsc::channel(8);
        let _ = a.registry().add(Arc::new(Connection::new(tx)));
        assert_eq!(a.stats().connections, 1);
        assert_eq!(b.stats().connections, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_drive_the_janitor() {
        let relay = relay();
        relay.start();
        assert!(relay.janitor().is_running());
        relay.stop().await;
        assert!(!relay.janitor().is_running());
    }
}
