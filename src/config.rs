//! Agent configuration parsing and validation.
//!
//! All settings have defaults matching the reference daemon, so the agent
//! runs without a config file. A TOML file may override any of them.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    62518
}

fn default_protocol_version() -> String {
    "1".into()
}

fn default_pool_size() -> u32 {
    3
}

fn default_chunk_size() -> usize {
    4096
}

/// Daemon address and protocol version, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address of the daemon.
    pub host: String,
    /// TCP port of the daemon.
    pub port: u16,
    /// Version line sent first on every connection.
    pub version: String,
}

impl Endpoint {
    /// `host:port` form accepted by [`tokio::net::TcpStream::connect`].
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Agent configuration parsed from an optional `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AgentConfig {
    /// Daemon host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Daemon TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Protocol version string sent during the handshake.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Number of long-lived pool connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Chunk size used when streaming file contents to the daemon.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol_version: default_protocol_version(),
            pool_size: default_pool_size(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// The immutable daemon endpoint described by this configuration.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            version: self.protocol_version.clone(),
        }
    }

    /// Check the invariants the session layer relies on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        if self.protocol_version.is_empty() || self.protocol_version.contains(['\n', '\r']) {
            return Err(AppError::Config(
                "protocol_version must be a non-empty single line".into(),
            ));
        }

        if self.pool_size == 0 {
            return Err(AppError::Config(
                "pool_size must be greater than zero".into(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(AppError::Config(
                "chunk_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
