//! Background eviction of idle cache entries.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::UpdateCache;
use crate::metrics::CACHE_EVICTIONS_TOTAL;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically evicts cache entries idle beyond a threshold.
pub struct CacheJanitor {
    cache: Arc<UpdateCache>,
    interval: Duration,
    threshold: Duration,
    running: Mutex<Option<Running>>,
}

impl CacheJanitor {
    /// Janitor for `cache`, sweeping every `interval`.
    pub fn new(cache: Arc<UpdateCache>, interval: Duration, threshold: Duration) -> Self {
        Self {
            cache,
            interval,
            threshold,
            running: Mutex::new(None),
        }
    }

    /// One eviction pass. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let evicted = self.cache.evict_idle(self.threshold);
        if evicted > 0 {
            counter!(CACHE_EVICTIONS_TOTAL).increment(evicted as u64);
        }
        info!(evicted, remaining = self.cache.len(), "cache janitor sweep");
        evicted
    }

    /// Spawn the sweep loop. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let janitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + janitor.interval, janitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = janitor.sweep();
                    }
                    () = token.cancelled() => break,
                }
            }
            debug!("cache janitor stopped");
        });
        *running = Some(Running { cancel, handle });
        debug!(interval_secs = self.interval.as_secs(), "cache janitor started");
    }

    /// Stop the sweep loop and wait for it to exit.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    /// Whether the sweep loop is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}
