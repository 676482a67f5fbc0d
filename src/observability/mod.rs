//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server lifecycle and connections produce:
//!     → tracing events inside a `server{name, port}` span
//!     → logging.rs subscriber (pretty or JSON, filtered by RUST_LOG)
//! ```

pub mod logging;
