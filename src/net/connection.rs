//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Broadcast the server-wide connection state (Active → Draining → Closed)
//! - Generate unique connection IDs for tracing
//! - Count in-flight work so the drain phase knows when it is done
//! - Drive a single HTTP connection until it completes or is told to stop

use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub(crate) fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Server-wide state every connection observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connections are served normally.
    Active,
    /// No new requests; in-flight requests finish, keep-alive is refused.
    Draining,
    /// Grace period is over; connections are dropped where they stand.
    Closed,
}

/// Tracks in-flight work for graceful shutdown.
///
/// Two things keep a drain from completing: open connections and the
/// accept loop itself. Both hold a guard that releases on drop.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    /// Current count of open connections.
    active_count: Arc<AtomicU64>,
    /// Connections plus held accept loops; drain waits for zero.
    in_flight: Arc<watch::Sender<usize>>,
    /// State broadcast to connection tasks.
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionTracker {
    /// Create a new connection tracker in the `Active` state.
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        let (state, _) = watch::channel(ConnectionState::Active);
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(in_flight),
            state: Arc::new(state),
        }
    }

    /// Record a new open connection. Returns a guard that releases it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            _hold: self.hold(),
            id: ConnectionId::new(),
        }
    }

    /// Keep the drain from completing until the returned guard is dropped.
    pub fn hold(&self) -> DrainGuard {
        self.in_flight.send_modify(|n| *n += 1);
        DrainGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Get current open connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Move `Active → Draining`. Later calls are no-ops.
    pub fn drain(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Active {
                *state = ConnectionState::Draining;
                true
            } else {
                false
            }
        });
    }

    /// Move to `Closed`, dropping every open connection.
    pub fn force_close(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        });
    }

    /// Wait until no guard is alive.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one unit of in-flight work when dropped.
#[derive(Debug)]
pub struct DrainGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n -= 1);
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    _hold: DrainGuard,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// How a served connection ended.
#[derive(Debug)]
pub enum ConnectionEnd {
    /// The peer or the protocol finished the connection.
    Completed,
    /// The connection was dropped because the state reached `Closed`.
    ForceClosed,
}

/// Serve HTTP on `io` until the connection ends or the state says stop.
///
/// On `Draining` the connection finishes its in-flight request and refuses
/// further ones. On `Closed` the connection future is dropped, which closes
/// the socket and cancels the handler.
pub async fn serve_connection<I>(
    io: I,
    router: Router,
    builder: &Builder<TokioExecutor>,
    mut state: watch::Receiver<ConnectionState>,
) -> Result<ConnectionEnd, Box<dyn StdError + Send + Sync>>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let conn = builder.serve_connection(TokioIo::new(io), TowerToHyperService::new(router));
    let mut conn = std::pin::pin!(conn);

    // State may have moved before this task got to run.
    match *state.borrow_and_update() {
        ConnectionState::Active => {}
        ConnectionState::Draining => conn.as_mut().graceful_shutdown(),
        ConnectionState::Closed => return Ok(ConnectionEnd::ForceClosed),
    }

    loop {
        tokio::select! {
            result = conn.as_mut() => return result.map(|()| ConnectionEnd::Completed),
            changed = state.changed() => {
                if changed.is_err() {
                    return conn.as_mut().await.map(|()| ConnectionEnd::Completed);
                }
                match *state.borrow_and_update() {
                    ConnectionState::Active => {}
                    ConnectionState::Draining => conn.as_mut().graceful_shutdown(),
                    ConnectionState::Closed => return Ok(ConnectionEnd::ForceClosed),
                }
            }
        }
    }
}
