//! Commands and responses exchanged with the daemon.
//!
//! | Tag            | Direction        | Served by pool |
//! |----------------|------------------|----------------|
//! | `open`         | agent → daemon   | no             |
//! | `read`         | daemon → agent   | yes            |
//! | `write`        | daemon → agent   | yes            |
//! | `exists`       | daemon → agent   | yes            |
//! | `is_directory` | daemon → agent   | yes            |

use std::env;
use std::fmt::{Display, Formatter};
use std::path::{Component, Path, PathBuf};

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::protocol::codec::WireCodec;
use crate::{AppError, Result};

/// Command tag, the first line of every command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommandTag {
    /// Announce a file the user wants to edit.
    Open,
    /// Stream a file's contents to the daemon.
    Read,
    /// Receive a file's contents from the daemon.
    Write,
    /// Report whether a path exists.
    Exists,
    /// Report whether a path is a directory.
    IsDirectory,
}

impl CommandTag {
    /// Parse a tag line. Unknown tags yield `None`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "open" => Some(Self::Open),
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "exists" => Some(Self::Exists),
            "is_directory" => Some(Self::IsDirectory),
            _ => None,
        }
    }

    /// Wire spelling of the tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Exists => "exists",
            Self::IsDirectory => "is_directory",
        }
    }

    /// Whether a pool connection accepts this tag from the daemon.
    #[must_use]
    pub fn is_served(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl Display for CommandTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded (or outbound) command with its normalized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Outbound announcement; `size` is `None` for a new file (no payload).
    Open {
        /// File to open.
        path: PathBuf,
        /// Length of the payload that follows, if any.
        size: Option<u64>,
    },
    /// Read request.
    Read {
        /// File to read.
        path: PathBuf,
    },
    /// Write request.
    Write {
        /// File to write.
        path: PathBuf,
    },
    /// Existence query.
    Exists {
        /// Path to test.
        path: PathBuf,
    },
    /// Directory query.
    IsDirectory {
        /// Path to test.
        path: PathBuf,
    },
}

impl Command {
    /// Build a served command from its tag and raw path line.
    ///
    /// The path goes through [`normalize_path`] first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` for `open`, which the daemon never sends
    /// to the agent.
    pub fn from_parts(tag: CommandTag, raw_path: &str) -> Result<Self> {
        let path = normalize_path(raw_path)?;
        match tag {
            CommandTag::Open => Err(AppError::Protocol(
                "open is not accepted from the daemon".into(),
            )),
            CommandTag::Read => Ok(Self::Read { path }),
            CommandTag::Write => Ok(Self::Write { path }),
            CommandTag::Exists => Ok(Self::Exists { path }),
            CommandTag::IsDirectory => Ok(Self::IsDirectory { path }),
        }
    }

    /// The command's tag.
    #[must_use]
    pub fn tag(&self) -> CommandTag {
        match self {
            Self::Open { .. } => CommandTag::Open,
            Self::Read { .. } => CommandTag::Read,
            Self::Write { .. } => CommandTag::Write,
            Self::Exists { .. } => CommandTag::Exists,
            Self::IsDirectory { .. } => CommandTag::IsDirectory,
        }
    }

    /// The command's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Open { path, .. }
            | Self::Read { path }
            | Self::Write { path }
            | Self::Exists { path }
            | Self::IsDirectory { path } => path,
        }
    }
}

/// Response header lines written by the handlers.
///
/// File contents are not part of the value: after [`Response::FileStream`]
/// the handler writes the raw bytes itself, then [`Response::EndOfStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `ok`
    Ok,
    /// `error` followed by a one-line message.
    Error(String),
    /// `true` / `false`
    Boolean(bool),
    /// Byte count announcing a payload.
    FileStream {
        /// Number of raw bytes that follow.
        length: u64,
    },
    /// `0`, closing a streamed read.
    EndOfStream,
}

impl Encoder<Command> for WireCodec {
    type Error = AppError;

    /// Encode the tag line, the path line and, for `open` with content, the
    /// size line. Payload bytes are sent separately as chunks.
    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<()> {
        self.encode_line(item.tag().as_str(), dst)?;
        self.encode_line(&item.path().to_string_lossy(), dst)?;
        if let Command::Open {
            size: Some(size), ..
        } = item
        {
            self.encode_line(&size.to_string(), dst)?;
        }
        Ok(())
    }
}

impl Encoder<Response> for WireCodec {
    type Error = AppError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<()> {
        match item {
            Response::Ok => self.encode_line("ok", dst),
            Response::Error(message) => {
                self.encode_line("error", dst)?;
                self.encode_line(&single_line(&message), dst)
            }
            Response::Boolean(value) => self.encode_line(if value { "true" } else { "false" }, dst),
            Response::FileStream { length } => self.encode_line(&length.to_string(), dst),
            Response::EndOfStream => self.encode_line("0", dst),
        }
    }
}

/// Resolve a raw path line to an absolute, lexically normalized path.
///
/// Relative paths (including the empty path) are joined onto the current
/// directory; `.` segments are dropped and `..` pops a segment (never above
/// the root). Symlinks are not resolved.
///
/// # Errors
///
/// Returns `AppError::Io` if the current directory is needed and
/// unavailable.
pub fn normalize_path(raw: &str) -> Result<PathBuf> {
    let candidate = Path::new(raw);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        env::current_dir()
            .map_err(|err| AppError::Io(format!("cannot resolve current directory: {err}")))?
            .join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                // Popping past the root is a no-op, as with `cd /..`.
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
        }
    }

    Ok(normalized)
}

/// Collapse line breaks so a message cannot desynchronize the framing.
fn single_line(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}
