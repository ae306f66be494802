//! Relay teardown: stop accepting, close every session with 1001, wait for
//! the sessions to drain, then stop the relay's background work.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

use crate::relay::TrackingRelay;

/// How long sessions get to close before the relay stops without them.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown signal shared by the HTTP server and every live session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without waiting.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wrap a session so [`Self::graceful_shutdown`] waits for it.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions still running.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Shut the relay down.
    ///
    /// Cancels the token, which stops the listener and sends every session a
    /// going-away close. Waits up to `timeout` for the HTTP task and the
    /// sessions, then stops the relay's janitor either way.
    pub async fn graceful_shutdown(
        &self,
        server: JoinHandle<()>,
        relay: &TrackingRelay,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            sessions = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "draining sessions"
        );

        let drain = async {
            if let Err(e) = server.await {
                warn!(error = %e, "http server task failed");
            }
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = self.sessions.len(),
                "shutdown timed out after {timeout:?}, abandoning sessions"
            );
        }

        relay.stop().await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
