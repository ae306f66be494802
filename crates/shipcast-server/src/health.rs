//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Shipments with a cache entry.
    pub cached_shipments: usize,
    /// Live subscriptions.
    pub subscriptions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, stats: RelayStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        cached_shipments: stats.cached_shipments,
        subscriptions: stats.subscriptions,
    }
}
