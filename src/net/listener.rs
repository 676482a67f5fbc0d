//! TCP listener owned by a single server lifecycle.
//!
//! # Responsibilities
//! - Bind to the configured port on all interfaces
//! - Accept incoming TCP connections
//! - Classify accept failures as per-connection, transient or terminal
//!
//! # Design Decisions
//! - The port string is handed to the resolver untouched; only bind validates it
//! - Dropping the listener is the only way the socket gets closed
//! - Running out of descriptors or buffers is transient; the caller backs off

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Terminal condition of the accept loop.
#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    /// The listener was closed on purpose as part of shutdown.
    #[error("listener closed")]
    Closed,
    /// Accepting failed for a reason other than shutdown.
    #[error("failed to accept connection: {0}")]
    Io(#[source] io::Error),
    /// The accept task panicked or was cancelled before reporting.
    #[error("accept task terminated abnormally: {0}")]
    Task(String),
}

impl AcceptError {
    /// Returns true for the expected error produced by an intentional close.
    pub fn is_benign(&self) -> bool {
        matches!(self, AcceptError::Closed)
    }

    /// Returns true when the process is short on a resource and accepting
    /// again after a pause may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AcceptError::Io(e) if is_resource_exhaustion(e))
    }
}

/// Anything the accept loop can take connections from.
pub(crate) trait AcceptSource: Send + Sync + 'static {
    fn local_addr(&self) -> SocketAddr;

    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), AcceptError>> + Send;
}

/// A bound TCP listener.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `0.0.0.0:<port>`.
    pub async fn bind(port: &str) -> io::Result<Self> {
        let inner = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let local_addr = inner.local_addr()?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Accept the next connection.
    ///
    /// Errors that only concern the peer being accepted are logged and
    /// skipped. Anything else is returned; see [`AcceptError::is_transient`].
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(peer_addr = %addr, "Connection accepted");
                    return Ok((stream, addr));
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Dropped connection during accept");
                }
                Err(e) => return Err(AcceptError::Io(e)),
            }
        }
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl AcceptSource for Listener {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        Listener::accept(self).await
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

fn is_resource_exhaustion(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }

    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}
