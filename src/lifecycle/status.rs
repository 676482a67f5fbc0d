//! Server status tracking.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Where a server is in its lifecycle. States are only ever visited in
/// declaration order, and `Stopped`/`Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerStatus {
    NotStarted,
    Serving,
    Draining,
    Stopped,
    Failed,
}

impl ServerStatus {
    /// `Stopped` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerStatus::Stopped | ServerStatus::Failed)
    }

    /// Lowercase label, as rendered by `Display`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::NotStarted => "not_started",
            ServerStatus::Serving => "serving",
            ServerStatus::Draining => "draining",
            ServerStatus::Stopped => "stopped",
            ServerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    status: ServerStatus,
    local_addr: Option<SocketAddr>,
}

/// Forward-only status cell shared between the lifecycle and observers.
#[derive(Debug)]
pub(crate) struct StatusCell {
    tx: watch::Sender<Snapshot>,
    started: AtomicBool,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(Snapshot {
            status: ServerStatus::NotStarted,
            local_addr: None,
        });
        Self {
            tx,
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> ServerStatus {
        self.tx.borrow().status
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.tx.borrow().local_addr
    }

    /// Claim the single run this cell allows. Returns false if a run was
    /// already claimed.
    pub(crate) fn claim(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn serving(&self, addr: SocketAddr) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.status != ServerStatus::NotStarted {
                return false;
            }
            snapshot.status = ServerStatus::Serving;
            snapshot.local_addr = Some(addr);
            true
        });
    }

    /// Advance to `next` if it lies ahead of the current status.
    pub(crate) fn advance(&self, next: ServerStatus) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if next <= snapshot.status || snapshot.status.is_terminal() {
                return false;
            }
            snapshot.status = next;
            true
        })
    }

    /// Wait until the status satisfies `predicate`.
    pub(crate) async fn wait_for(&self, predicate: impl Fn(ServerStatus) -> bool) -> ServerStatus {
        let mut rx = self.tx.subscribe();
        let reached = rx
            .wait_for(|snapshot| predicate(snapshot.status))
            .await
            .map(|snapshot| snapshot.status);
        reached.unwrap_or_else(|_| self.get())
    }
}
