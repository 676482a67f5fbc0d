//! Graceful HTTP server wrapper.
//!
//! Runs an axum router on a single listening socket and owns its shutdown:
//! the first SIGINT/SIGTERM (or a manual `shutdown()`) stops accepting,
//! in-flight connections get a bounded grace period, and a second signal
//! exits the process immediately.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use http::{HttpServer, ServerError};
pub use lifecycle::{NotificationHandle, ServerStatus, Shutdown, SignalGate};
