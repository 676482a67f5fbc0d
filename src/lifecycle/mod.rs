//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → NotificationHandle fires (once)
//!     second SIGTERM/SIGINT → exit(1)
//!
//! Shutdown (shutdown.rs):
//!     shutdown() from any task → latched trigger
//!
//! Status (status.rs):
//!     NotStarted → Serving → Draining → Stopped | Failed
//! ```
//!
//! # Design Decisions
//! - Whichever trigger fires first wins; later ones are no-ops
//! - Shutdown has a deadline: connections are dropped once it passes
//! - States are never revisited

pub mod shutdown;
pub mod signals;
pub mod status;

pub use shutdown::Shutdown;
pub use signals::{NotificationHandle, SignalGate};
pub use status::ServerStatus;
