//! WebSocket session lifecycle: one connected tracking client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use shipcast_auth::Identity;
use shipcast_core::{Message, RelayError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::Connection;
use crate::config::ServerConfig;
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::relay::TrackingRelay;

/// How long cleanup waits for the outbound task to flush its close frame.
const OUTBOUND_DRAIN: Duration = Duration::from_secs(1);

/// Shortest ping interval a session will run with.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Per-session timing and queue limits.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    /// Outbound queue length.
    pub queue_capacity: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before disconnecting.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            queue_capacity: config.outbound_queue_capacity.max(1),
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            heartbeat_timeout: config.heartbeat_timeout,
        }
    }
}

/// Run a session for an admitted client.
///
/// 1. Registers the connection and moves it to `Active`
/// 2. Forwards queued frames and sends periodic pings
/// 3. Routes inbound text and binary frames
/// 4. On any exit path, closes the connection and removes it from the registry
#[instrument(skip_all, fields(conn_id = tracing::field::Empty))]
pub async fn run_ws_session(
    ws: WebSocket,
    relay: Arc<TrackingRelay>,
    identity: Option<Identity>,
    limits: SessionLimits,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(limits.queue_capacity);
    let connection = Arc::new(Connection::new(send_tx));
    let conn_id = connection.id.clone();
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&conn_id));

    let user_id = identity.as_ref().map(|i| i.user_id.clone());
    let _ = connection.authenticate(identity);
    let _ = relay.registry().add(connection.clone());
    let _ = connection.activate();

    info!(user_id = user_id.as_deref().unwrap_or("anonymous"), "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Cancelled by server shutdown, or by the outbound task when it gives up.
    let session_token = shutdown.child_token();

    let outbound_conn = connection.clone();
    let outbound_token = session_token.clone();
    let server_token = shutdown.clone();
    let mut outbound = tokio::spawn(async move {
        let _guard = outbound_token.clone().drop_guard();
        let mut ping_interval = tokio::time::interval(limits.heartbeat_interval);
        // skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(WsMessage::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    let silent = outbound_conn.silent_for();
                    if silent > limits.heartbeat_timeout {
                        warn!(
                            conn_id = %outbound_conn.id,
                            silent_secs = silent.as_secs(),
                            "client unresponsive, disconnecting"
                        );
                        let _ = ws_tx.send(WsMessage::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "heartbeat timeout".into(),
                        }))).await;
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_token.cancelled() => {
                    let frame = if server_token.is_cancelled() {
                        CloseFrame { code: close_code::AWAY, reason: "server shutting down".into() }
                    } else {
                        CloseFrame { code: close_code::NORMAL, reason: "".into() }
                    };
                    let _ = ws_tx.send(WsMessage::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    'session: loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = session_token.cancelled() => break,
        };
        let Some(Ok(frame)) = frame else { break };

        let text = match frame {
            WsMessage::Text(ref t) => Some(t.as_str()),
            WsMessage::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s),
                Err(_) => {
                    connection.heard();
                    debug!(len = data.len(), "non-UTF-8 binary frame");
                    let err = RelayError::protocol("Binary frame is not valid UTF-8");
                    if !reply(&connection, &Message::error(&err, None), &session_token).await {
                        break;
                    }
                    None
                }
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                connection.heard();
                None
            }
            WsMessage::Close(_) => {
                info!("client sent close frame");
                break;
            }
        };

        let Some(text) = text else { continue };
        for msg in relay.router().handle(&connection, text).await {
            if !reply(&connection, &msg, &session_token).await {
                break 'session;
            }
        }
    }

    let _ = connection.close();
    let _ = relay.registry().remove(&conn_id);
    session_token.cancel();
    if tokio::time::timeout(OUTBOUND_DRAIN, &mut outbound).await.is_err() {
        outbound.abort();
    }

    let stats = connection.stats();
    info!(
        messages_sent = stats.messages_sent,
        dropped = stats.dropped,
        "client disconnected"
    );
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
}

/// Refuse an upgraded socket: send the error, then close with 1008.
pub async fn reject_ws_session(mut ws: WebSocket, err: RelayError) {
    if let Ok(json) = Message::error(&err, None).to_json() {
        let _ = ws.send(WsMessage::Text(json.into())).await;
    }
    let _ = ws
        .send(WsMessage::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: err.to_string().into(),
        })))
        .await;
}

/// Queue a reply to the client's own request.
///
/// Waits for queue space, so a backed-up client stalls only its own inbound
/// loop. Returns `false` once the session is going away.
async fn reply(connection: &Connection, msg: &Message, session: &CancellationToken) -> bool {
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(kind = msg.kind.type_name(), error = %e, "failed to serialize reply");
            return true;
        }
    };
    tokio::select! {
        queued = connection.reply(Arc::new(json)) => {
            if !queued {
                debug!(kind = msg.kind.type_name(), "reply dropped, connection closed");
            }
            queued
        }
        () = session.cancelled() => false,
    }
}
