//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! server.toml (optional)
//!     → loader.rs (parse & deserialize into ServerSettings)
//!     → ServerConfig::from_settings (load TLS material)
//!     → builder overrides (with_port, with_router, ...)
//!     → ServerConfig (immutable once handed to the server)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server owns it
//! - All fields have defaults to allow minimal configs
//! - The port is only validated by the bind call

pub mod loader;
pub mod schema;

pub use loader::{load_settings, ConfigError};
pub use schema::{ServerConfig, ServerSettings, TlsSettings};
