//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused by the auth gate (counter).
pub const WS_AUTH_REJECTIONS_TOTAL: &str = "ws_auth_rejections_total";
/// Upgrades refused at the connection cap (counter).
pub const WS_CAPACITY_REJECTIONS_TOTAL: &str = "ws_capacity_rejections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames delivered by the broadcaster (counter).
pub const BROADCAST_MESSAGES_TOTAL: &str = "broadcast_messages_total";
/// Broadcaster sends that failed (counter).
pub const BROADCAST_SEND_FAILURES_TOTAL: &str = "broadcast_send_failures_total";
/// Entries removed by the cache janitor (counter).
pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
/// Inbound client messages (counter, labels: kind).
pub const INBOUND_MESSAGES_TOTAL: &str = "inbound_messages_total";
