//! Outbound `open` announcement for the launch argument.
//!
//! The launch path is inspected once, before any connection: a directory is
//! rejected, a missing path is a new file (no payload), and an existing file
//! is opened right away so the handle announced later is the one that was
//! checked. Its size and contents are streamed right after the command.

use std::path::{Path, PathBuf};

use futures_util::SinkExt;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::handlers::{fs_error, stream_file};
use crate::protocol::codec::{self, FrameWriter};
use crate::protocol::command::{normalize_path, Command};
use crate::Result;

/// An already-opened launch file and the size it had when opened.
#[derive(Debug)]
struct LaunchFile {
    file: std::fs::File,
    size: u64,
}

/// File to announce on the main connection.
#[derive(Debug)]
pub struct OpenTarget {
    path: PathBuf,
    source: Option<LaunchFile>,
}

impl OpenTarget {
    /// A file that does not exist yet; no payload follows the announcement.
    #[must_use]
    pub fn new_file(path: PathBuf) -> Self {
        Self { path, source: None }
    }

    /// Open an existing file for announcement.
    ///
    /// The size is taken from the opened handle, not from a separate stat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Filesystem` if the file cannot be opened or
    /// stat'ed.
    pub fn open_existing(path: PathBuf) -> Result<Self> {
        let file = std::fs::File::open(&path).map_err(|err| fs_error("open", &path, &err))?;
        let size = file
            .metadata()
            .map_err(|err| fs_error("stat", &path, &err))?
            .len();
        Ok(Self {
            path,
            source: Some(LaunchFile { file, size }),
        })
    }

    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Announced length, or `None` for a new file.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.source.as_ref().map(|source| source.size)
    }
}

/// Outcome of inspecting the launch argument.
#[derive(Debug)]
pub enum LaunchTarget {
    /// The argument names a directory; the agent must not start.
    Directory(PathBuf),
    /// The argument names a file, existing (and opened) or not.
    File(OpenTarget),
}

impl LaunchTarget {
    /// Normalize, stat, and open the launch argument.
    ///
    /// A stat failure (not found, permission denied on a parent) is treated
    /// as a new file. A path that stats as a file but cannot be opened is an
    /// error, so startup fails before any connection is made.
    ///
    /// # Errors
    ///
    /// `AppError::Filesystem` if an existing file cannot be opened, or
    /// `AppError::Io` if a relative path cannot be resolved.
    pub fn resolve(arg: &Path) -> Result<Self> {
        let path = normalize_path(&arg.to_string_lossy())?;
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Ok(Self::Directory(path)),
            Ok(_) => OpenTarget::open_existing(path).map(Self::File),
            Err(err) => {
                info!(path = %path.display(), %err, "launch path not found, opening as new file");
                Ok(Self::File(OpenTarget::new_file(path)))
            }
        }
    }
}

/// Send `open`, the path, and (for an existing file) the size and contents.
///
/// # Errors
///
/// `AppError::TruncatedStream` if the file shrank below the announced size,
/// `AppError::Io` on a read failure, or a socket error.
pub async fn open<W>(writer: &mut FrameWriter<W>, target: OpenTarget, chunk_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let OpenTarget { path, source } = target;
    let size = source.as_ref().map(|source| source.size);

    writer
        .feed(Command::Open {
            path: path.clone(),
            size,
        })
        .await?;

    if let Some(LaunchFile { file, size }) = source {
        debug!(size, "streaming launch file");
        stream_file(writer, File::from_std(file), &path, size, chunk_size).await?;
    }

    codec::flush(writer).await?;

    info!(path = %path.display(), ?size, "open request sent");
    Ok(())
}
