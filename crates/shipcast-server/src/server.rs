//! `ShipcastServer`: Axum HTTP + WebSocket front end for the relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_AUTH_REJECTIONS_TOTAL, WS_CAPACITY_REJECTIONS_TOTAL};
use crate::relay::TrackingRelay;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{self, SessionLimits};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The relay every session attaches to.
    pub relay: Arc<TrackingRelay>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Per-session limits.
    pub limits: SessionLimits,
    /// Connection cap.
    pub max_connections: usize,
    /// Largest accepted inbound message.
    pub max_message_size: usize,
}

/// Query string accepted by `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Bearer token, when not sent in the `Authorization` header.
    pub token: Option<String>,
}

/// The shipment-tracking server.
pub struct ShipcastServer {
    config: ServerConfig,
    relay: Arc<TrackingRelay>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl ShipcastServer {
    /// Create a server around `relay`.
    pub fn new(
        config: ServerConfig,
        relay: Arc<TrackingRelay>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            relay,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            limits: SessionLimits::from(&self.config),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in the background. Returns the bound address and the
    /// server task, which ends once [`ShutdownCoordinator::shutdown`] fires.
    /// Pass the task to [`ShutdownCoordinator::graceful_shutdown`] to drain.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "shipcast server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server exited with error");
            }
            info!("http server stopped");
        });
        Ok((local_addr, handle))
    }

    /// The relay behind this server.
    pub fn relay(&self) -> &Arc<TrackingRelay> {
        &self.relay
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
///
/// Refuses with 503 at the connection cap. Otherwise upgrades; a refused
/// token gets an error frame and a 1008 close on the upgraded socket.
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let connections = state.relay.registry().count();
    if connections >= state.max_connections {
        counter!(WS_CAPACITY_REJECTIONS_TOTAL).increment(1);
        warn!(connections, max = state.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let ws = match ws {
        Ok(ws) => ws.max_message_size(state.max_message_size),
        Err(rejection) => return rejection.into_response(),
    };

    let token = bearer_token(&headers).or(query.token.as_deref());
    match state.relay.gate().admit(token) {
        Ok(identity) => {
            let relay = state.relay.clone();
            let coordinator = state.shutdown.clone();
            let limits = state.limits;
            ws.on_upgrade(move |socket| {
                let shutdown = coordinator.token();
                coordinator.track_session(session::run_ws_session(
                    socket, relay, identity, limits, shutdown,
                ))
            })
        }
        Err(err) => {
            counter!(WS_AUTH_REJECTIONS_TOTAL).increment(1);
            ws.on_upgrade(move |socket| session::reject_ws_session(socket, err))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.relay.stats()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
