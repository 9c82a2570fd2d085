//! Graceful shutdown.
//!
//! Shutdown is a [`CancellationToken`]. Every request runs under a child of
//! that token, so cancelling it aborts in-flight pipelines at their next
//! suspension point. [`ConnectionTracker`] bounds open connections and lets
//! the server wait for them to drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `token` on SIGINT or SIGTERM.
///
/// Runs until a signal arrives or the token is cancelled elsewhere.
pub async fn shutdown_on_signal(token: CancellationToken) {
    tokio::select! {
        () = wait_for_os_signal() => token.cancel(),
        () = token.cancelled() => {}
    }
}

/// Waits for an OS shutdown signal.
///
/// On Unix this waits for SIGTERM or SIGINT, elsewhere for Ctrl+C. If a
/// handler cannot be installed the error is logged and this never resolves.
async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to install signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to wait for Ctrl+C");
            return std::future::pending().await;
        }
        info!("received Ctrl+C, shutting down");
    }
}

/// Counts open connections against a limit.
///
/// # Example
///
/// ```rust
/// use warden_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new(1);
///
/// let token = tracker.try_acquire().unwrap();
/// assert_eq!(tracker.active_connections(), 1);
/// assert!(tracker.try_acquire().is_none());
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
    limit: usize,
}

impl ConnectionTracker {
    /// Creates a tracker admitting at most `limit` connections.
    ///
    /// A limit of zero means unlimited.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            notify: Arc::new(Notify::new()),
            limit: if limit == 0 { usize::MAX } else { limit },
        }
    }

    /// Reserves a slot, or returns `None` when the limit is reached.
    ///
    /// The slot is released when the token drops.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConnectionToken> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        })
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every connection has closed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the two is not missed.
            notified.as_mut().enable();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

/// An open connection's slot in a [`ConnectionTracker`].
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
