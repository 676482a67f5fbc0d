//! Configuration schema definitions.
//!
//! `ServerConfig` is what a server runs with. `ServerSettings` is its
//! on-disk form, deserialized from TOML and turned into a `ServerConfig`
//! once TLS material has been loaded.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::net::tls::load_tls_config;

pub const DEFAULT_NAME: &str = "default";
pub const DEFAULT_PORT: &str = "8080";
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a server needs to run.
///
/// Built from defaults with the `with_*` methods:
///
/// ```ignore
/// let config = ServerConfig::new()
///     .with_name("api")
///     .with_port("3000")
///     .with_router(router);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Label attached to every log event of the server.
    pub name: String,
    /// Port to listen on. Anything the resolver accepts, `"0"` picks a free port.
    pub port: String,
    /// Per-connection read timeout and per-request timeout.
    pub io_timeout: Duration,
    /// Grace period for draining connections after shutdown is triggered.
    pub shutdown_timeout: Duration,
    /// TLS material; plain TCP when `None`.
    pub tls: Option<RustlsConfig>,
    /// Handler for every accepted connection.
    pub router: Router,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: RustlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Build a config from file settings, loading TLS material if configured.
    pub async fn from_settings(settings: ServerSettings, router: Router) -> Result<Self, ConfigError> {
        let mut config = Self::new()
            .with_name(settings.name)
            .with_port(settings.port)
            .with_io_timeout(Duration::from_secs(settings.io_timeout_secs))
            .with_shutdown_timeout(Duration::from_secs(settings.shutdown_timeout_secs))
            .with_router(router);

        if let Some(tls) = settings.tls {
            let rustls = load_tls_config(&tls.cert_path, &tls.key_path)
                .await
                .map_err(ConfigError::Tls)?;
            config = config.with_tls(rustls);
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            port: DEFAULT_PORT.to_string(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            tls: None,
            router: Router::new(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("io_timeout", &self.io_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

/// File form of the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server name used in logs.
    pub name: String,

    /// Port to listen on.
    pub port: String,

    /// Read/write timeout in seconds.
    pub io_timeout_secs: u64,

    /// Shutdown grace period in seconds.
    pub shutdown_timeout_secs: u64,

    /// Optional TLS certificate and key.
    pub tls: Option<TlsSettings>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            port: DEFAULT_PORT.to_string(),
            io_timeout_secs: DEFAULT_IO_TIMEOUT.as_secs(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}
