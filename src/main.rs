//! Graceful server (example binary)
//!
//! Serves a few demo routes and shuts down cleanly on SIGINT/SIGTERM.
//!
//! # Shutdown Overview
//!
//! ```text
//!   SIGINT/SIGTERM ──▶ SignalGate ──▶ NotificationHandle fires
//!                          │                   │
//!                          │                   ▼
//!   second signal ─────────┘          HttpServer: Serving → Draining
//!   exit(1), no cleanup                        │  listener closed
//!                                              │  in-flight requests finish
//!                                              ▼
//!                                  grace elapsed? force close → Failed
//!                                  otherwise              → Stopped
//! ```

use std::path::PathBuf;

use clap::Parser;

use graceful_server::config::{load_settings, ServerSettings, TlsSettings};
use graceful_server::http::routes::demo_router;
use graceful_server::observability::logging::{self, LogFormat};
use graceful_server::{HttpServer, ServerConfig, SignalGate};

#[derive(Parser, Debug)]
#[command(name = "graceful-server")]
#[command(about = "HTTP server with graceful shutdown", long_about = None)]
struct Cli {
    /// TOML settings file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server name used in logs
    #[arg(long)]
    name: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<String>,

    /// Read/write timeout in seconds
    #[arg(long)]
    io_timeout_secs: Option<u64>,

    /// Shutdown grace period in seconds
    #[arg(long)]
    shutdown_timeout_secs: Option<u64>,

    /// PEM certificate; requires --tls-key
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key; requires --tls-cert
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Result<ServerSettings, Box<dyn std::error::Error>> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => ServerSettings::default(),
        };

        if let Some(name) = &self.name {
            settings.name = name.clone();
        }
        if let Some(port) = &self.port {
            settings.port = port.clone();
        }
        if let Some(secs) = self.io_timeout_secs {
            settings.io_timeout_secs = secs;
        }
        if let Some(secs) = self.shutdown_timeout_secs {
            settings.shutdown_timeout_secs = secs;
        }
        if let (Some(cert_path), Some(key_path)) = (&self.tls_cert, &self.tls_key) {
            settings.tls = Some(TlsSettings {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            });
        }

        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let format = if cli.json { LogFormat::Json } else { LogFormat::Pretty };
    logging::init(format)?;

    let settings = cli.settings()?;
    let config = ServerConfig::from_settings(settings, demo_router()).await?;

    tracing::info!(
        name = %config.name,
        port = %config.port,
        io_timeout = ?config.io_timeout,
        shutdown_timeout = ?config.shutdown_timeout,
        tls = config.tls.is_some(),
        "Configuration loaded"
    );

    let signals = SignalGate::new();
    let notification = signals.arm()?;

    let server = HttpServer::new(config);
    server.listen_and_serve(notification.fired()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
