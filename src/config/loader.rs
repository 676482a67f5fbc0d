//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerSettings;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("TLS error: {0}")]
    Tls(#[source] std::io::Error),
}

/// Load server settings from a TOML file. Missing keys take their defaults.
pub fn load_settings(path: &Path) -> Result<ServerSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_settings(&content)
}

/// Parse server settings from TOML text.
pub fn parse_settings(content: &str) -> Result<ServerSettings, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}
