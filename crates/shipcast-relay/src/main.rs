//! # shipcast-relay
//!
//! Relay binary: wires settings, the `SQLite` shipment store, the auth gate,
//! and the tracking server together, then serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shipcast_auth::{JwtVerifier, TokenVerifier};
use shipcast_core::logging::init_subscriber;
use shipcast_server::metrics::install_recorder;
use shipcast_server::{AuthGate, CacheConfig, ServerConfig, ShipcastServer, TrackingRelay};
use shipcast_settings::{RelaySettings, load_settings_from_path, settings_path, shipcast_home};
use shipcast_store::SqliteShipmentStore;
use tracing::{info, warn};

/// Real-time shipment-tracking relay.
#[derive(Parser, Debug)]
#[command(name = "shipcast-relay", about = "Real-time shipment-tracking relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` shipment database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (defaults to `~/.shipcast/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }

    fn resolve_db_path(&self, settings: &RelaySettings) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| settings.store.resolve_db_path(&shipcast_home()))
    }
}

fn build_gate(settings: &RelaySettings) -> AuthGate {
    let verifier = settings.auth.jwt_secret.as_deref().map(|secret| {
        Arc::new(JwtVerifier::new(secret.as_bytes(), settings.auth.issuer.clone()))
            as Arc<dyn TokenVerifier>
    });
    if verifier.is_none() {
        info!("no JWT secret configured, connections presenting a token will be refused");
    }
    AuthGate::new(verifier, settings.auth.allow_anonymous)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    init_subscriber(&settings.logging.level, settings.logging.format);

    let db_path = cli.resolve_db_path(&settings);
    let store = SqliteShipmentStore::open(&db_path)
        .with_context(|| format!("Failed to open shipment store at {}", db_path.display()))?;
    info!(path = %db_path.display(), "shipment store opened");

    let relay = Arc::new(TrackingRelay::new(
        Arc::new(store),
        build_gate(&settings),
        &CacheConfig::from(&settings.cache),
    ));
    relay.start();

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let server = ShipcastServer::new(ServerConfig::from(&settings.server), relay.clone(), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("shipcast relay listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(handle, &relay, None)
        .await;
    Ok(())
}
