//! OS signal handling.
//!
//! # Responsibilities
//! - Register interest in SIGINT and SIGTERM (ctrl-c elsewhere)
//! - Turn the first signal into a one-shot notification
//! - Exit the process on a repeated signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - One gate per process, created in `main` and passed by reference
//! - A second SIGTERM/SIGINT means graceful shutdown is stuck: exit(1), no cleanup

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Process-scoped converter from OS termination signals to a notification.
///
/// Arming registers the process signal handlers and may happen once; a
/// second `arm` would race the first handler for the same signals and
/// aborts the process instead.
#[derive(Debug, Default)]
pub struct SignalGate {
    armed: AtomicBool,
}

impl SignalGate {
    /// Create an unarmed gate.
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    /// Register for SIGINT/SIGTERM and start the watchdog task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Aborts
    /// Aborts the process if this gate was already armed.
    pub fn arm(&self) -> io::Result<NotificationHandle> {
        if self.armed.swap(true, Ordering::SeqCst) {
            tracing::error!("Signal gate armed twice, aborting");
            std::process::abort();
        }

        let signals = OsSignals::register()?;
        tracing::debug!("Signal handlers installed");

        Ok(spawn_watchdog(signals, exit_on_repeat))
    }

    /// Whether `arm` has been called.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Fires once, on the first termination signal.
#[derive(Debug, Clone)]
pub struct NotificationHandle {
    rx: watch::Receiver<bool>,
}

impl NotificationHandle {
    /// Whether the signal has arrived.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the first signal arrives. Never resolves if the signal
    /// source goes away without one.
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        let fired = rx.wait_for(|fired| *fired).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}

fn exit_on_repeat(signal: &'static str) {
    tracing::error!(signal, "Second shutdown signal received, exiting immediately");
    std::process::exit(1);
}

/// A stream of named termination signals.
pub(crate) trait SignalSource {
    /// Next signal, or `None` once the source can deliver no more.
    fn recv(&mut self) -> impl Future<Output = Option<&'static str>> + Send;
}

/// Watch `source`: the first signal fires the returned handle, the second
/// one is handed to `on_repeat`.
pub(crate) fn spawn_watchdog<S, F>(mut source: S, on_repeat: F) -> NotificationHandle
where
    S: SignalSource + Send + 'static,
    F: FnOnce(&'static str) + Send + 'static,
{
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let Some(first) = source.recv().await else {
            return;
        };
        tracing::info!(signal = first, "Shutdown signal received");
        tx.send_replace(true);

        if let Some(second) = source.recv().await {
            on_repeat(second);
        }
    });

    NotificationHandle { rx }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
impl SignalSource for OsSignals {
    fn recv(&mut self) -> impl Future<Output = Option<&'static str>> + Send {
        async move {
            tokio::select! {
                received = self.interrupt.recv() => received.map(|()| "SIGINT"),
                received = self.terminate.recv() => received.map(|()| "SIGTERM"),
            }
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }
}

#[cfg(not(unix))]
impl SignalSource for OsSignals {
    fn recv(&mut self) -> impl Future<Output = Option<&'static str>> + Send {
        async { tokio::signal::ctrl_c().await.ok().map(|()| "ctrl-c") }
    }
}
