//! Error types shared across the agent.

use std::fmt::{Display, Formatter};

/// Shared agent result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Agent error enumeration covering all protocol and filesystem failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or identity lookup failure.
    Config(String),
    /// The daemon endpoint could not be reached.
    Connect(String),
    /// Malformed command, length line, or oversized frame.
    Protocol(String),
    /// Stat, open, read, or write failure on the local filesystem.
    Filesystem(String),
    /// The peer closed the stream before a declared payload was complete.
    TruncatedStream(String),
    /// Socket or other I/O failure.
    Io(String),
}

impl AppError {
    /// Whether this error must end the connection it occurred on.
    ///
    /// Filesystem failures are reported to the peer and the connection keeps
    /// serving; every other kind leaves the stream in an unknown state.
    #[must_use]
    pub fn is_fatal_for_connection(&self) -> bool {
        !matches!(self, Self::Filesystem(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Connect(msg) => write!(f, "connect: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Filesystem(msg) => write!(f, "filesystem: {msg}"),
            Self::TruncatedStream(msg) => write!(f, "truncated stream: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
