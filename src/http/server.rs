//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Bind the listener and run the accept loop as a background task
//! - Serve each connection with the configured router and timeouts
//! - Wait for the first shutdown trigger (signal, manual, accept failure)
//! - Drain in-flight connections within the grace period, then force-close
//! - Join the accept loop and report exactly one outcome

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::schema::DEFAULT_IO_TIMEOUT;
use crate::config::ServerConfig;
use crate::lifecycle::status::StatusCell;
use crate::lifecycle::{ServerStatus, Shutdown};
use crate::net::connection::{
    serve_connection, ConnectionEnd, ConnectionGuard, ConnectionState, ConnectionTracker, DrainGuard,
};
use crate::net::listener::{AcceptError, AcceptSource, Listener};
use crate::net::tls;

/// First pause after a transient accept error; doubles up to [`ACCEPT_BACKOFF_MAX`].
const ACCEPT_BACKOFF_START: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Error returned by [`HttpServer::listen_and_serve`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listener could not be bound. Nothing was started.
    #[error("failed to bind port {port:?}: {source}")]
    Bind {
        port: String,
        #[source]
        source: io::Error,
    },
    /// The accept loop ended for a reason other than shutdown.
    #[error("accept loop failed: {0}")]
    AcceptLoop(#[source] AcceptError),
    /// Connections were still open when the grace period ran out.
    #[error("graceful shutdown timed out after {grace:?}")]
    ShutdownTimeout { grace: Duration },
    /// `listen_and_serve` was already called on this server.
    #[error("server already started")]
    AlreadyStarted,
}

/// What moved the server out of `Serving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// The shutdown signal future resolved.
    Signal,
    /// [`HttpServer::shutdown`] was called.
    Manual,
    /// The accept loop terminated on its own.
    AcceptFailed,
}

impl ShutdownTrigger {
    /// Label used in the `trigger` log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownTrigger::Signal => "signal",
            ShutdownTrigger::Manual => "shutdown",
            ShutdownTrigger::AcceptFailed => "accept_failed",
        }
    }
}

/// HTTP server owning one listening socket.
///
/// A server runs once: `NotStarted → Serving → Draining → Stopped | Failed`.
/// Share it behind an `Arc` (or hand out [`HttpServer::shutdown_handle`])
/// to stop it from another task.
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
    shutdown: Shutdown,
    status: StatusCell,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let router = Self::build_router(&config);
        Self {
            config,
            router,
            shutdown: Shutdown::new(),
            status: StatusCell::new(),
        }
    }

    /// Wrap the configured router with the request timeout and tracing layers.
    fn build_router(config: &ServerConfig) -> Router {
        let router = config.router.clone();
        let router = if config.io_timeout.is_zero() {
            router
        } else {
            router.layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.io_timeout,
            ))
        };
        router.layer(TraceLayer::new_for_http())
    }

    /// Serve until `signal` resolves or [`shutdown`](Self::shutdown) is
    /// called, then drain.
    ///
    /// Returns the bind error immediately if the port cannot be bound.
    /// Otherwise returns once the drain finished (or timed out) and the
    /// accept loop has been joined.
    pub async fn listen_and_serve<F>(&self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let span = tracing::info_span!("server", name = %self.config.name, port = %self.config.port);
        self.run(signal).instrument(span).await
    }

    async fn run<F>(&self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if !self.status.claim() {
            tracing::warn!("listen_and_serve called on a server that already ran");
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match Listener::bind(&self.config.port).await {
            Ok(listener) => listener,
            Err(source) => {
                tracing::error!(error = %source, "Unable to bind listener");
                self.status.advance(ServerStatus::Failed);
                return Err(ServerError::Bind {
                    port: self.config.port.clone(),
                    source,
                });
            }
        };

        self.serve(listener, signal).await
    }

    /// Everything after a successful bind: serve, wait for a trigger, drain.
    async fn serve<L, F>(&self, listener: L, signal: F) -> Result<(), ServerError>
    where
        L: AcceptSource,
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr();
        self.status.serving(local_addr);
        tracing::info!(address = %local_addr, tls = self.config.tls.is_some(), "Starting server");

        let tracker = ConnectionTracker::new();
        let ctx = ConnectionContext::new(&self.config, self.router.clone(), tracker.clone());
        let mut accept_task = tokio::spawn(accept_loop(listener, ctx, tracker.hold()).in_current_span());

        let mut accept_exit = None;
        let trigger = tokio::select! {
            () = signal => ShutdownTrigger::Signal,
            () = self.shutdown.triggered() => ShutdownTrigger::Manual,
            exit = &mut accept_task => {
                accept_exit = Some(exit);
                ShutdownTrigger::AcceptFailed
            }
        };

        self.status.advance(ServerStatus::Draining);
        tracing::info!(
            trigger = trigger.as_str(),
            active_connections = tracker.active_count(),
            "Shutting down server"
        );

        let grace = self.config.shutdown_timeout;
        tracker.drain();
        let drained = match tokio::time::timeout(grace, tracker.wait_idle()).await {
            Ok(()) => Ok(()),
            // Only the accept loop is left, and it exits as soon as it sees the drain.
            Err(_) if tracker.active_count() == 0 => {
                tracker.wait_idle().await;
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    grace = ?grace,
                    active_connections = tracker.active_count(),
                    "Grace period elapsed, closing remaining connections"
                );
                tracker.force_close();
                tracker.wait_idle().await;
                Err(ServerError::ShutdownTimeout { grace })
            }
        };

        let accept_exit = match accept_exit {
            Some(exit) => exit,
            None => accept_task.await,
        };
        let accepted = match accept_exit {
            Ok(exit) if exit.is_benign() => Ok(()),
            Ok(exit) => Err(ServerError::AcceptLoop(exit)),
            Err(join_error) => Err(ServerError::AcceptLoop(AcceptError::Task(join_error.to_string()))),
        };

        let result = accepted.and(drained);
        match &result {
            Ok(()) => {
                self.status.advance(ServerStatus::Stopped);
                tracing::info!("Server stopped");
            }
            Err(e) => {
                self.status.advance(ServerStatus::Failed);
                tracing::error!(error = %e, "Server graceful shutdown failed");
            }
        }
        result
    }

    /// Request a graceful shutdown. Never blocks; repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::debug!(name = %self.config.name, "Shutdown requested");
        }
    }

    /// A cloneable handle that triggers the same shutdown as [`shutdown`](Self::shutdown).
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ServerStatus {
        self.status.get()
    }

    /// Wait until the server has bound its listener (or failed to) and
    /// return the bound address, if any.
    pub async fn serving(&self) -> Option<SocketAddr> {
        self.status.wait_for(|status| status >= ServerStatus::Serving).await;
        self.status.local_addr()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Everything a connection task needs, cloned per connection.
#[derive(Clone)]
struct ConnectionContext {
    router: Router,
    builder: Builder<TokioExecutor>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ConnectionContext {
    fn new(config: &ServerConfig, router: Router, tracker: ConnectionTracker) -> Self {
        let mut builder = Builder::new(TokioExecutor::new());
        if !config.io_timeout.is_zero() {
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(config.io_timeout);
        }

        let handshake_timeout = if config.io_timeout.is_zero() {
            DEFAULT_IO_TIMEOUT
        } else {
            config.io_timeout
        };

        Self {
            router,
            builder,
            tls: config.tls.as_ref().map(tls::acceptor),
            handshake_timeout,
            tracker,
        }
    }
}

/// Accept connections until the tracker leaves `Active` or accepting fails.
///
/// Always returns the terminal condition; the listener is dropped (closed)
/// before `_hold` releases the drain.
///
/// Transient failures (out of descriptors or memory) pause the loop with an
/// exponential backoff; a drain that starts during the pause still wins.
async fn accept_loop<L: AcceptSource>(listener: L, ctx: ConnectionContext, _hold: DrainGuard) -> AcceptError {
    let mut state = ctx.tracker.state_receiver();
    let mut backoff: Option<Duration> = None;

    let exit = 'accept: loop {
        tokio::select! {
            biased;
            () = async { let _ = state.wait_for(|state| *state != ConnectionState::Active).await; } => break AcceptError::Closed,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    backoff = None;
                    let guard = ctx.tracker.track();
                    tracing::debug!(connection_id = %guard.id(), peer_addr = %peer_addr, "Serving connection");
                    tokio::spawn(handle_connection(stream, ctx.clone(), guard).in_current_span());
                }
                Err(e) if e.is_transient() => {
                    let delay = backoff.map_or(ACCEPT_BACKOFF_START, |d| (d * 2).min(ACCEPT_BACKOFF_MAX));
                    backoff = Some(delay);
                    tracing::warn!(error = %e, retry_in = ?delay, "Accept failed, retrying");
                    tokio::select! {
                        biased;
                        _ = state.wait_for(|state| *state != ConnectionState::Active) => break 'accept AcceptError::Closed,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Server crashed");
                    break e;
                }
            },
        }
    };

    drop(listener);
    tracing::debug!("Listener closed");
    exit
}

async fn handle_connection(stream: TcpStream, ctx: ConnectionContext, guard: ConnectionGuard) {
    let ConnectionContext {
        router,
        builder,
        tls: acceptor,
        handshake_timeout,
        tracker,
    } = ctx;

    let result = match acceptor {
        None => serve_connection(stream, router, &builder, tracker.state_receiver()).await,
        Some(acceptor) => {
            let mut state = tracker.state_receiver();
            let handshake = tokio::select! {
                result = tls::handshake(&acceptor, stream, handshake_timeout) => result,
                _ = state.wait_for(|state| *state == ConnectionState::Closed) => return,
            };
            match handshake {
                Ok(stream) => serve_connection(stream, router, &builder, state).await,
                Err(e) => {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "TLS handshake failed");
                    return;
                }
            }
        }
    };

    match result {
        Ok(ConnectionEnd::Completed) => {}
        Ok(ConnectionEnd::ForceClosed) => {
            tracing::debug!(connection_id = %guard.id(), "Connection closed at shutdown deadline");
        }
        Err(e) => {
            tracing::debug!(connection_id = %guard.id(), error = %e, "Error serving connection");
        }
    }
}
