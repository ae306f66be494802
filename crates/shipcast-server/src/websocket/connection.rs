//! Per-socket connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use shipcast_auth::Identity;
use shipcast_core::ConnectionId;
use shipcast_core::protocol::TRACKING_TOPIC;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Socket upgraded, identity not yet applied.
    Connecting,
    /// Admitted by the auth gate.
    Authenticated,
    /// Registered and able to subscribe.
    Active,
    /// Torn down. Terminal.
    Closed,
}

/// Traffic counters for one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Frames successfully queued.
    pub messages_sent: u64,
    /// Bytes successfully queued.
    pub bytes_sent: u64,
    /// Frames dropped because the queue was full or closed.
    pub dropped: u64,
}

/// A connected tracking client.
///
/// Owned by the registry; everything else holds an `Arc` snapshot.
pub struct Connection {
    /// Unique connection id.
    pub id: ConnectionId,
    identity: Mutex<Option<Identity>>,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Arc<String>>,
    connected_at: Instant,
    last_activity: Mutex<Instant>,
    last_heard: Mutex<Instant>,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped: AtomicU64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// New connection with a fresh id, in the `Connecting` state.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(ConnectionId::new(), tx)
    }

    /// New connection with a caller-chosen id.
    pub fn with_id(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: Mutex::new(None),
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            connected_at: now,
            last_activity: Mutex::new(now),
            last_heard: Mutex::new(now),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Record the admitted identity (`None` for anonymous) and move to
    /// `Authenticated`.
    pub fn authenticate(&self, identity: Option<Identity>) -> bool {
        *self.identity.lock() = identity;
        self.advance(ConnectionState::Authenticated)
    }

    /// Move to `Active`.
    pub fn activate(&self) -> bool {
        self.advance(ConnectionState::Active)
    }

    /// Move to `Closed`. Returns `true` only for the first call.
    pub fn close(&self) -> bool {
        self.advance(ConnectionState::Closed)
    }

    fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Whether frames can still be sent.
    pub fn is_open(&self) -> bool {
        self.state() != ConnectionState::Closed && !self.tx.is_closed()
    }

    /// Identity supplied at admission, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    /// Topic categories this connection belongs to.
    pub fn topics(&self) -> &'static [&'static str] {
        &[TRACKING_TOPIC]
    }

    /// Queue a frame without blocking.
    ///
    /// Returns `false` when the connection is closed or its queue is full;
    /// the frame is then counted as dropped.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.state() == ConnectionState::Closed {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let len = frame.len() as u64;
        if self.tx.try_send(frame).is_ok() {
            self.record_sent(len);
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a reply to this client's own request, waiting for queue space.
    ///
    /// Returns `false` only when the connection is closed; the frame is then
    /// counted as dropped.
    pub async fn reply(&self, frame: Arc<String>) -> bool {
        if self.state() == ConnectionState::Closed {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let len = frame.len() as u64;
        if self.tx.send(frame).await.is_ok() {
            self.record_sent(len);
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    fn record_sent(&self, len: u64) {
        let _ = self.messages_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        self.touch();
    }

    /// Note inbound or outbound traffic.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Note that the client said something (frame or pong).
    pub fn heard(&self) {
        let now = Instant::now();
        *self.last_heard.lock() = now;
        *self.last_activity.lock() = now;
    }

    /// Time since any traffic in either direction.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Time since the client last sent anything.
    pub fn silent_for(&self) -> Duration {
        self.last_heard.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
