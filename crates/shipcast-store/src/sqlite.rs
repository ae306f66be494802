//! `SQLite`-backed shipment store.
//!
//! Schema:
//! - `shipments(id INTEGER PRIMARY KEY, created_at TEXT)`
//! - `shipment_updates(id, shipment_id, status, description, location, timestamp)`
//!
//! Timestamps are stored as RFC 3339 text so ordering by the column is
//! chronological. Trait reads run on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use shipcast_core::{ShipmentId, ShipmentUpdate};
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::traits::{NewUpdate, ShipmentStore};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS shipments (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS shipment_updates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    shipment_id INTEGER NOT NULL REFERENCES shipments(id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    description TEXT NOT NULL,
    location TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_shipment_updates_recent
    ON shipment_updates(shipment_id, timestamp DESC, id DESC);
";

/// Shipment store over a single `SQLite` connection.
#[derive(Clone)]
pub struct SqliteShipmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteShipmentStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
            }
        }
        debug!(?path, "opening shipment database");
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Make `shipment_id` known. Idempotent.
    pub fn register_shipment(&self, shipment_id: ShipmentId) -> Result<()> {
        let _ = self.conn.lock().execute(
            "INSERT OR IGNORE INTO shipments (id) VALUES (?1)",
            params![shipment_id.get()],
        )?;
        Ok(())
    }

    /// Append an update to a registered shipment.
    pub fn record_update(&self, shipment_id: ShipmentId, update: NewUpdate) -> Result<ShipmentUpdate> {
        let conn = self.conn.lock();
        let known: Option<i64> = conn
            .query_row(
                "SELECT id FROM shipments WHERE id = ?1",
                params![shipment_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(StoreError::UnknownShipment(shipment_id));
        }

        let _ = conn.execute(
            "INSERT INTO shipment_updates (shipment_id, status, description, location, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                shipment_id.get(),
                update.status,
                update.description,
                update.location,
                format_timestamp(update.timestamp),
            ],
        )?;
        Ok(update.into_update(conn.last_insert_rowid()))
    }

    /// Run `f` against the connection on tokio's blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

#[async_trait]
impl ShipmentStore for SqliteShipmentStore {
    async fn shipment_exists(&self, shipment_id: ShipmentId) -> Result<bool> {
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM shipments WHERE id = ?1",
                    params![shipment_id.get()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn fetch_recent_updates(
        &self,
        shipment_id: ShipmentId,
        limit: usize,
    ) -> Result<Vec<ShipmentUpdate>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, status, description, location, timestamp
                 FROM shipment_updates
                 WHERE shipment_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![shipment_id.get(), limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut updates = Vec::new();
            for row in rows {
                let (id, status, description, location, timestamp) = row?;
                updates.push(ShipmentUpdate {
                    id,
                    status,
                    description,
                    timestamp: parse_timestamp(&timestamp)?,
                    location,
                });
            }
            Ok(updates)
        })
        .await
    }
}
