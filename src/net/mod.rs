//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, terminal error classification)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (tracking, Active → Draining → Closed)
//!     → hyper connection serving the configured router
//! ```
//!
//! # Design Decisions
//! - The listener has exactly one owner and is closed by dropping it
//! - Each connection is tracked so the drain phase knows when it is done
//! - TLS is optional and handled per connection, off the accept path

pub mod connection;
pub mod listener;
pub mod tls;
