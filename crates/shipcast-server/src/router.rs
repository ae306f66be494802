//! Inbound message dispatch.

use std::sync::Arc;

use metrics::counter;
use shipcast_core::protocol::decode;
use shipcast_core::{Message, MessageId, MessageKind, RelayError, ShipmentId};
use shipcast_store::ShipmentStore;
use tracing::{debug, instrument, warn};

use crate::cache::UpdateCache;
use crate::metrics::INBOUND_MESSAGES_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::Connection;

/// Turns one inbound frame into the replies owed to its sender.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    cache: Arc<UpdateCache>,
    store: Arc<dyn ShipmentStore>,
}

impl MessageRouter {
    /// Router over the shared registry, cache, and store.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        cache: Arc<UpdateCache>,
        store: Arc<dyn ShipmentStore>,
    ) -> Self {
        Self {
            registry,
            cache,
            store,
        }
    }

    /// Handle raw inbound text from `conn`.
    ///
    /// Always returns at least one message: an `ack` or an `error`, possibly
    /// followed by a replay `batch_update`.
    #[instrument(skip_all, fields(conn_id = %conn.id))]
    pub async fn handle(&self, conn: &Connection, text: &str) -> Vec<Message> {
        conn.heard();

        let msg = match decode(text) {
            Ok(msg) => msg,
            Err(malformed) => {
                counter!(INBOUND_MESSAGES_TOTAL, "kind" => "malformed").increment(1);
                debug!(conn_id = %conn.id, reason = %malformed.reason, "malformed message");
                let (err, original) = malformed.into_error();
                return vec![Message::error(&err, original)];
            }
        };
        counter!(INBOUND_MESSAGES_TOTAL, "kind" => msg.kind.type_name()).increment(1);

        let original = msg.message_id;
        match msg.kind {
            MessageKind::Subscribe { shipment_id } => {
                self.subscribe(conn, shipment_id, original).await
            }
            MessageKind::Unsubscribe { shipment_id } => {
                let removed = self.registry.unsubscribe(&conn.id, shipment_id);
                debug!(conn_id = %conn.id, %shipment_id, removed, "unsubscribed");
                vec![Message::ack(original)]
            }
            kind @ (MessageKind::Update { .. }
            | MessageKind::StatusChange { .. }
            | MessageKind::LocationUpdate { .. }
            | MessageKind::BatchUpdate { .. }
            | MessageKind::Error { .. }
            | MessageKind::Ack { .. }) => {
                let err = RelayError::protocol(format!(
                    "Message type '{}' cannot be sent by clients",
                    kind.type_name()
                ));
                vec![Message::error(&err, Some(original))]
            }
        }
    }

    async fn subscribe(
        &self,
        conn: &Connection,
        shipment_id: ShipmentId,
        original: MessageId,
    ) -> Vec<Message> {
        match self.store.shipment_exists(shipment_id).await {
            Ok(true) => {}
            Ok(false) => {
                let err = RelayError::not_found(format!("Shipment {shipment_id} not found"));
                return vec![Message::error(&err, Some(original))];
            }
            Err(e) => {
                warn!(conn_id = %conn.id, %shipment_id, error = %e, "shipment lookup failed");
                return vec![Message::error(&e.into(), Some(original))];
            }
        }

        if let Err(err) = self.registry.subscribe(&conn.id, shipment_id) {
            warn!(conn_id = %conn.id, %shipment_id, error = %err, "subscribe bookkeeping failed");
            return vec![Message::error(&err, Some(original))];
        }
        debug!(conn_id = %conn.id, %shipment_id, "subscribed");

        let mut replies = vec![Message::ack(original)];
        match self.cache.recent(shipment_id, self.store.as_ref()).await {
            Ok(updates) if !updates.is_empty() => replies.push(Message::batch(updates)),
            Ok(_) => {}
            Err(e) => {
                warn!(%shipment_id, error = %e, "replay fetch failed, skipping replay");
            }
        }
        replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use assert_matches::assert_matches;
    use shipcast_store::{MemoryShipmentStore, NewUpdate};
    use tokio::sync::mpsc;

    struct Fixture {
        router: MessageRouter,
        registry: Arc<ConnectionRegistry>,
        store: Arc<MemoryShipmentStore>,
        conn: Arc<Connection>,
        _rx: mpsc::Receiver<Arc<String>>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(UpdateCache::new(&CacheConfig::default()));
        let store = Arc::new(MemoryShipmentStore::new());
        let router = MessageRouter::new(registry.clone(), cache, store.clone());
        let (tx, rx) = mpsc::channel(16);
        let conn = Arc::new(Connection::new(tx));
        let _ = conn.authenticate(None);
        let _ = registry.add(conn.clone());
        let _ = conn.activate();
        Fixture {
            router,
            registry,
            store,
            conn,
            _rx: rx,
        }
    }

    fn request(kind: &str, shipment: i64, id: &str) -> String {
        format!(
            r#"{{"type":"{kind}","shipmentId":{shipment},"timestamp":"2026-01-01T00:00:00Z","messageId":"{id}"}}"#
        )
    }

    fn error_of(msg: &Message) -> (u16, Option<&str>) {
        match &msg.kind {
            MessageKind::Error {
                code,
                original_message_id,
                ..
            } => (*code, original_message_id.as_ref().map(MessageId::as_str)),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_unknown_shipment_is_404() {
        let f = fixture();
        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 404, "m1")).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(error_of(&replies[0]), (404, Some("m1")));
        assert!(f.registry.subscriptions_of(&f.conn.id).is_empty());
    }

    #[tokio::test]
    async fn subscribe_without_history_acks_without_replay() {
        let f = fixture();
        f.store.register_shipment(ShipmentId::new(1));
        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 1, "m2")).await;
        assert_eq!(replies.len(), 1);
        assert_matches!(&replies[0].kind, MessageKind::Ack { original_message_id } if original_message_id.as_str() == "m2");
        assert!(f.registry.subscriptions_of(&f.conn.id).contains(&ShipmentId::new(1)));
    }

    #[tokio::test]
    async fn subscribe_replays_history_as_one_batch() {
        let f = fixture();
        let shipment = ShipmentId::new(7);
        f.store.register_shipment(shipment);
        for status in ["pending", "in_transit", "delivered"] {
            let _ = f.store.record_update(shipment, NewUpdate::now(status, status)).unwrap();
        }

        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 7, "m3")).await;
        assert_eq!(replies.len(), 2);
        assert_matches!(replies[0].kind, MessageKind::Ack { .. });
        assert_matches!(&replies[1].kind, MessageKind::BatchUpdate { updates } if updates.len() == 3);
    }

    #[tokio::test]
    async fn replay_is_capped_at_the_twenty_newest() {
        let f = fixture();
        let shipment = ShipmentId::new(8);
        f.store.register_shipment(shipment);
        let base = chrono::Utc::now() - chrono::Duration::hours(1);
        for n in 1..=25 {
            let _ = f
                .store
                .record_update(
                    shipment,
                    NewUpdate {
                        timestamp: base + chrono::Duration::minutes(n),
                        ..NewUpdate::now("in_transit", format!("scan {n}"))
                    },
                )
                .unwrap();
        }

        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 8, "m9")).await;
        assert_eq!(replies.len(), 2);
        let MessageKind::BatchUpdate { updates } = &replies[1].kind else {
            panic!("expected batch_update, got {:?}", replies[1].kind);
        };
        let scans: Vec<&str> = updates
            .iter()
            .map(|msg| match &msg.kind {
                MessageKind::Update { update, .. } => update.description.as_str(),
                other => panic!("expected shipment_update, got {other:?}"),
            })
            .collect();
        let expected: Vec<String> = (6..=25).rev().map(|n| format!("scan {n}")).collect();
        assert_eq!(scans, expected);
    }

    #[tokio::test]
    async fn store_outage_is_500_and_connection_stays_usable() {
        let f = fixture();
        f.store.register_shipment(ShipmentId::new(2));
        f.store.set_available(false);
        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 2, "m4")).await;
        assert_eq!(error_of(&replies[0]), (500, Some("m4")));

        f.store.set_available(true);
        let replies = f.router.handle(&f.conn, &request("subscribe_shipment", 2, "m5")).await;
        assert_matches!(replies[0].kind, MessageKind::Ack { .. });
    }

    #[tokio::test]
    async fn unsubscribe_acks_even_when_not_subscribed() {
        let f = fixture();
        let replies = f.router.handle(&f.conn, &request("unsubscribe_shipment", 99, "m6")).await;
        assert_matches!(&replies[0].kind, MessageKind::Ack { original_message_id } if original_message_id.as_str() == "m6");
    }

    #[tokio::test]
    async fn unknown_type_is_400_with_original_id() {
        let f = fixture();
        let text = r#"{"type":"bogus","timestamp":"2026-01-01T00:00:00Z","messageId":"m7"}"#;
        let replies = f.router.handle(&f.conn, text).await;
        assert_eq!(error_of(&replies[0]), (400, Some("m7")));
    }

    #[tokio::test]
    async fn invalid_json_is_400_without_id() {
        let f = fixture();
        let replies = f.router.handle(&f.conn, "{{{{").await;
        assert_eq!(error_of(&replies[0]), (400, None));
    }

    #[tokio::test]
    async fn server_only_kind_from_client_is_400() {
        let f = fixture();
        let text = r#"{"type":"ack","originalMessageId":"x","timestamp":"2026-01-01T00:00:00Z","messageId":"m8"}"#;
        let replies = f.router.handle(&f.conn, text).await;
        assert_eq!(error_of(&replies[0]), (400, Some("m8")));
    }

    #[tokio::test(start_paused = true)]
    async fn every_inbound_message_touches_activity() {
        let f = fixture();
        tokio::time::advance(std::time::Duration::from_secs(30)).await;
        assert!(f.conn.idle_for() >= std::time::Duration::from_secs(30));
        let _ = f.router.handle(&f.conn, "garbage").await;
        assert_eq!(f.conn.idle_for(), std::time::Duration::ZERO);
    }
}
