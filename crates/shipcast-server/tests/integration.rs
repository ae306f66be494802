//! End-to-end tests against a live server using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use shipcast_auth::{Identity, JwtVerifier};
use shipcast_core::{ShipmentId, ShipmentUpdate};
use shipcast_server::{AuthGate, CacheConfig, ServerConfig, ShipcastServer, TrackingRelay};
use shipcast_store::{MemoryShipmentStore, NewUpdate};

const TIMEOUT: Duration = Duration::from_secs(5);
const SECRET: &[u8] = b"integration-secret";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    url: String,
    server: ShipcastServer,
    http: JoinHandle<()>,
    store: Arc<MemoryShipmentStore>,
}

impl TestServer {
    fn relay(&self) -> &Arc<TrackingRelay> {
        self.server.relay()
    }

    /// Wait until the registry holds exactly `n` connections.
    async fn wait_for_connections(&self, n: usize) {
        timeout(TIMEOUT, async {
            while self.relay().stats().connections != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }
}

async fn boot_with(config: ServerConfig, gate: AuthGate) -> TestServer {
    let store = Arc::new(MemoryShipmentStore::new());
    let relay = Arc::new(TrackingRelay::new(
        store.clone(),
        gate,
        &CacheConfig::default(),
    ));
    relay.start();
    let server = ShipcastServer::new(config, relay, None);
    let (addr, http) = server.listen().await.unwrap();
    TestServer {
        url: format!("ws://{addr}/ws"),
        server,
        http,
        store,
    }
}

async fn boot() -> TestServer {
    boot_with(ServerConfig::default(), AuthGate::anonymous_only()).await
}

fn jwt_gate() -> (AuthGate, JwtVerifier) {
    let verifier = JwtVerifier::new(SECRET, None);
    let gate = AuthGate::new(Some(Arc::new(JwtVerifier::new(SECRET, None))), true);
    (gate, verifier)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Read the next text message as JSON, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Read until a close frame arrives and return its code.
async fn read_close_code(ws: &mut WsStream) -> Option<u16> {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("timeout waiting for close") {
            Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return None,
        }
    }
}

fn request(kind: &str, shipment: i64, id: &str) -> String {
    json!({
        "type": kind,
        "shipmentId": shipment,
        "timestamp": "2026-01-01T00:00:00Z",
        "messageId": id,
    })
    .to_string()
}

async fn subscribe(ws: &mut WsStream, shipment: i64, id: &str) -> Value {
    ws.send(Message::text(request("subscribe_shipment", shipment, id)))
        .await
        .unwrap();
    read_json(ws).await
}

fn update(id: i64, status: &str) -> ShipmentUpdate {
    ShipmentUpdate {
        id,
        status: status.into(),
        description: format!("{status} scan"),
        timestamp: chrono::Utc::now(),
        location: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_change_without_subscribers_reaches_nobody() {
    let ts = boot().await;
    let reached = ts.relay().broadcaster().broadcast_status_change(
        ShipmentId::new(42),
        "pending",
        "in_transit",
        "picked up",
    );
    assert_eq!(reached, 0);
    assert!(!ts.relay().cache().contains(ShipmentId::new(42)));
}

#[tokio::test]
async fn subscribe_replays_stored_history_newest_first() {
    let ts = boot().await;
    let shipment = ShipmentId::new(7);
    ts.store.register_shipment(shipment);
    for (status, mins) in [("pending", 30), ("in_transit", 20), ("out_for_delivery", 10)] {
        let _ = ts
            .store
            .record_update(
                shipment,
                NewUpdate {
                    timestamp: chrono::Utc::now() - chrono::Duration::minutes(mins),
                    ..NewUpdate::now(status, status)
                },
            )
            .unwrap();
    }

    let mut ws = connect(&ts.url).await;
    let ack = subscribe(&mut ws, 7, "sub-7").await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["originalMessageId"], "sub-7");

    let batch = read_json(&mut ws).await;
    assert_eq!(batch["type"], "batch_update");
    let statuses: Vec<&str> = batch["updates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| {
            assert_eq!(u["type"], "shipment_update");
            u["update"]["status"].as_str().unwrap()
        })
        .collect();
    assert_eq!(statuses, ["out_for_delivery", "in_transit", "pending"]);
}

#[tokio::test]
async fn live_updates_reach_subscriber_and_cache_keeps_twenty() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(9));
    let mut ws = connect(&ts.url).await;
    assert_eq!(subscribe(&mut ws, 9, "sub-9").await["type"], "ack");

    for n in 1..=25 {
        assert_eq!(
            ts.relay()
                .broadcaster()
                .broadcast_update(ShipmentId::new(9), update(n, "in_transit")),
            1
        );
    }
    for n in 1..=25 {
        let msg = read_json(&mut ws).await;
        assert_eq!(msg["type"], "shipment_update");
        assert_eq!(msg["shipmentId"], 9);
        assert_eq!(msg["update"]["id"], n);
    }
    assert_eq!(ts.relay().cache().peek(ShipmentId::new(9)).unwrap().len(), 20);
}

#[tokio::test]
async fn late_subscriber_replays_only_the_twenty_newest_broadcasts() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(11));
    let mut first = connect(&ts.url).await;
    assert_eq!(subscribe(&mut first, 11, "first").await["type"], "ack");
    for n in 1..=25 {
        let _ = ts
            .relay()
            .broadcaster()
            .broadcast_update(ShipmentId::new(11), update(n, "in_transit"));
    }

    let mut second = connect(&ts.url).await;
    assert_eq!(subscribe(&mut second, 11, "second").await["type"], "ack");
    let batch = read_json(&mut second).await;
    assert_eq!(batch["type"], "batch_update");
    let ids: Vec<i64> = batch["updates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["update"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (6..=25).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn zero_heartbeat_interval_still_serves_requests() {
    let config = ServerConfig {
        heartbeat_interval: Duration::ZERO,
        ..ServerConfig::default()
    };
    let ts = boot_with(config, AuthGate::anonymous_only()).await;
    ts.store.register_shipment(ShipmentId::new(3));
    let mut ws = connect(&ts.url).await;
    let ack = subscribe(&mut ws, 3, "fast-ping").await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["originalMessageId"], "fast-ping");
}

#[tokio::test]
async fn unknown_type_is_400_and_connection_stays_usable() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(1));
    let mut ws = connect(&ts.url).await;

    let bogus = json!({"type": "bogus", "timestamp": "2026-01-01T00:00:00Z", "messageId": "b-1"});
    ws.send(Message::text(bogus.to_string())).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], 400);
    assert_eq!(err["originalMessageId"], "b-1");

    assert_eq!(subscribe(&mut ws, 1, "after").await["type"], "ack");
}

#[tokio::test]
async fn invalid_json_is_400_without_original_id() {
    let ts = boot().await;
    let mut ws = connect(&ts.url).await;
    ws.send(Message::text("not json")).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["code"], 400);
    assert!(err.get("originalMessageId").is_none());
}

#[tokio::test]
async fn subscribe_to_unknown_shipment_is_404() {
    let ts = boot().await;
    let mut ws = connect(&ts.url).await;
    let err = subscribe(&mut ws, 404, "missing").await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], 404);
    assert_eq!(err["originalMessageId"], "missing");
}

#[tokio::test]
async fn disconnect_drops_every_subscription() {
    let ts = boot().await;
    for s in [3, 5] {
        ts.store.register_shipment(ShipmentId::new(s));
    }
    let mut ws = connect(&ts.url).await;
    assert_eq!(subscribe(&mut ws, 3, "s3").await["type"], "ack");
    assert_eq!(subscribe(&mut ws, 5, "s5").await["type"], "ack");
    assert_eq!(ts.relay().stats().subscriptions, 2);

    ws.close(None).await.unwrap();
    drop(ws);
    ts.wait_for_connections(0).await;

    let broadcaster = ts.relay().broadcaster();
    assert_eq!(broadcaster.broadcast_update(ShipmentId::new(3), update(1, "x")), 0);
    assert_eq!(broadcaster.broadcast_status_change(ShipmentId::new(5), "a", "b", "c"), 0);
    assert_eq!(ts.relay().stats().subscriptions, 0);
}

#[tokio::test]
async fn unsubscribe_acks_and_stops_delivery() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(2));
    let mut ws = connect(&ts.url).await;
    assert_eq!(subscribe(&mut ws, 2, "s2").await["type"], "ack");

    ws.send(Message::text(request("unsubscribe_shipment", 2, "u2")))
        .await
        .unwrap();
    let ack = read_json(&mut ws).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["originalMessageId"], "u2");
    assert_eq!(
        ts.relay()
            .broadcaster()
            .broadcast_update(ShipmentId::new(2), update(1, "x")),
        0
    );
}

#[tokio::test]
async fn binary_frames_are_routed_like_text() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(11));
    let mut ws = connect(&ts.url).await;

    ws.send(Message::binary(request("subscribe_shipment", 11, "bin").into_bytes()))
        .await
        .unwrap();
    let ack = read_json(&mut ws).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["originalMessageId"], "bin");

    ws.send(Message::binary(vec![0xff, 0xfe, 0xfd])).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["code"], 400);
}

#[tokio::test]
async fn invalid_token_gets_401_then_policy_close() {
    let (gate, _) = jwt_gate();
    let ts = boot_with(ServerConfig::default(), gate).await;
    let mut ws = connect(&format!("{}?token=not-a-jwt", ts.url)).await;

    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], 401);
    assert_eq!(read_close_code(&mut ws).await, Some(1008));
    assert_eq!(ts.relay().stats().connections, 0);
}

#[tokio::test]
async fn valid_token_is_admitted() {
    let (gate, verifier) = jwt_gate();
    let ts = boot_with(ServerConfig::default(), gate).await;
    ts.store.register_shipment(ShipmentId::new(8));
    let token = verifier
        .issue(&Identity::user("buyer-1"), chrono::Duration::minutes(5))
        .unwrap();

    let mut ws = connect(&format!("{}?token={token}", ts.url)).await;
    assert_eq!(subscribe(&mut ws, 8, "s8").await["type"], "ack");

    let conns = ts.relay().registry().connections();
    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].identity().unwrap().user_id, "buyer-1");
}

#[tokio::test]
async fn connection_cap_refuses_with_503() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let ts = boot_with(config, AuthGate::anonymous_only()).await;
    let _first = connect(&ts.url).await;
    ts.wait_for_connections(1).await;

    match connect_async(ts.url.as_str()).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
            assert_eq!(resp.status().as_u16(), 503);
        }
        Err(e) => panic!("expected HTTP 503, got {e}"),
        Ok(_) => panic!("expected HTTP 503, got an upgraded socket"),
    }
}

#[tokio::test]
async fn silent_client_is_disconnected_by_heartbeat() {
    let config = ServerConfig {
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(150),
        ..ServerConfig::default()
    };
    let ts = boot_with(config, AuthGate::anonymous_only()).await;
    // never polled, so pings go unanswered
    let _ws = connect(&ts.url).await;
    ts.wait_for_connections(1).await;
    ts.wait_for_connections(0).await;
}

#[tokio::test]
async fn shutdown_closes_sessions_with_going_away() {
    let ts = boot().await;
    let mut ws = connect(&ts.url).await;
    ts.wait_for_connections(1).await;

    let TestServer { server, http, .. } = ts;
    let relay = server.relay().clone();
    let coordinator = server.shutdown().clone();
    let drain = coordinator.graceful_shutdown(http, &relay, Some(TIMEOUT));
    let (code, ()) = tokio::join!(read_close_code(&mut ws), drain);

    assert_eq!(code, Some(1001));
    assert_eq!(coordinator.live_sessions(), 0);
    assert_eq!(relay.stats().connections, 0);
    assert!(!relay.janitor().is_running());
}

#[tokio::test]
async fn health_reports_live_counters() {
    let ts = boot().await;
    ts.store.register_shipment(ShipmentId::new(4));
    let mut ws = connect(&ts.url).await;
    assert_eq!(subscribe(&mut ws, 4, "s4").await["type"], "ack");

    let addr = ts.url.trim_start_matches("ws://").trim_end_matches("/ws");
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let req = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, req.as_bytes())
        .await
        .unwrap();
    let mut raw = String::new();
    let _ = tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut raw)
        .await
        .unwrap();

    let body = raw.split("\r\n\r\n").nth(1).unwrap();
    let health: Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["subscriptions"], 1);
}
