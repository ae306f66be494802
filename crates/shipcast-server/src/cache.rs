//! Bounded per-shipment cache of recent update messages.
//!
//! Each entry holds at most `max_updates` messages, newest first, and the
//! instant it was last refreshed (by a broadcast push or a store read).
//! Subscribe replay reads through to the store when an entry is missing or
//! older than the freshness window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use shipcast_core::{Message, MessageId, MessageKind, ShipmentId, ShipmentUpdate};
use shipcast_store::{ShipmentStore, StoreError};
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;

struct CacheEntry {
    updates: VecDeque<Message>,
    refreshed_at: Instant,
}

/// Recent-update cache.
pub struct UpdateCache {
    entries: Mutex<HashMap<ShipmentId, CacheEntry>>,
    max_updates: usize,
    freshness_window: Duration,
}

impl UpdateCache {
    /// Create an empty cache.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_updates: config.max_updates.max(1),
            freshness_window: config.freshness_window,
        }
    }

    /// Bound on entries per shipment.
    pub fn max_updates(&self) -> usize {
        self.max_updates
    }

    /// Prepend `message` to the shipment's entry, creating it if needed,
    /// trimming the oldest beyond the bound, and refreshing its timestamp.
    pub fn push(&self, shipment: ShipmentId, message: Message) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(shipment).or_insert_with(|| CacheEntry {
            updates: VecDeque::with_capacity(self.max_updates),
            refreshed_at: Instant::now(),
        });
        entry.updates.push_front(message);
        entry.updates.truncate(self.max_updates);
        entry.refreshed_at = Instant::now();
    }

    /// Recent updates for replay, newest first.
    ///
    /// Served from memory when the entry is fresh; otherwise the store is
    /// queried (without holding the lock) and the entry replaced.
    pub async fn recent(
        &self,
        shipment: ShipmentId,
        store: &dyn ShipmentStore,
    ) -> Result<Vec<Message>, StoreError> {
        if let Some(cached) = self.fresh(shipment) {
            debug!(%shipment, count = cached.len(), "cache hit");
            return Ok(cached);
        }

        let started = Instant::now();
        let fetched = store.fetch_recent_updates(shipment, self.max_updates).await?;
        debug!(%shipment, count = fetched.len(), "cache refilled from store");

        let mut updates: VecDeque<Message> = fetched
            .into_iter()
            .map(|update| replay_message(shipment, update))
            .collect();
        updates.truncate(self.max_updates);

        let mut entries = self.entries.lock();
        // A broadcast landed while the store was being read; keep its entry.
        if let Some(existing) = entries.get(&shipment) {
            if existing.refreshed_at > started {
                return Ok(existing.updates.iter().cloned().collect());
            }
        }
        let result: Vec<Message> = updates.iter().cloned().collect();
        let _ = entries.insert(
            shipment,
            CacheEntry {
                updates,
                refreshed_at: Instant::now(),
            },
        );
        Ok(result)
    }

    fn fresh(&self, shipment: ShipmentId) -> Option<Vec<Message>> {
        let entries = self.entries.lock();
        let entry = entries.get(&shipment)?;
        (entry.refreshed_at.elapsed() < self.freshness_window)
            .then(|| entry.updates.iter().cloned().collect())
    }

    /// Drop entries not refreshed within `threshold`. Returns how many.
    pub fn evict_idle(&self, threshold: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.refreshed_at.elapsed() <= threshold);
        before - entries.len()
    }

    /// Cached messages for `shipment` without touching the store.
    pub fn peek(&self, shipment: ShipmentId) -> Option<Vec<Message>> {
        self.entries
            .lock()
            .get(&shipment)
            .map(|e| e.updates.iter().cloned().collect())
    }

    /// Whether an entry exists for `shipment`.
    pub fn contains(&self, shipment: ShipmentId) -> bool {
        self.entries.lock().contains_key(&shipment)
    }

    /// Number of cached shipments.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Wrap a stored update as a replayable message stamped with its own time.
fn replay_message(shipment_id: ShipmentId, update: ShipmentUpdate) -> Message {
    Message {
        timestamp: update.timestamp,
        message_id: MessageId::new(),
        kind: MessageKind::Update {
            shipment_id,
            update,
        },
    }
}
