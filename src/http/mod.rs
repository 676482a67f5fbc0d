//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loop, hyper connection, drain coordination)
//!     → configured axum Router (timeout + trace layers added by the server)
//!     → Send to client
//! ```

pub mod routes;
pub mod server;

pub use server::{HttpServer, ServerError, ShutdownTrigger};
