//! File operation handlers.
//!
//! Each handler performs one filesystem action for a decoded [`Command`] and
//! writes the protocol response on the same connection. Filesystem failures
//! are converted to `error` responses here and never escape as `Err`; any
//! `Err` a handler returns means the stream itself is no longer usable.
//!
//! - `query`: `exists` and `is_directory`.
//! - `read`: stream a file to the daemon.
//! - `write`: receive a chunked file from the daemon.
//! - `open`: outbound announcement sent on the main connection.

use std::path::Path;

use bytes::BytesMut;
use futures_util::SinkExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tracing::{info_span, warn, Instrument};

use crate::protocol::codec::{Frame, FrameReader, FrameWriter};
use crate::protocol::command::{Command, Response};
use crate::{AppError, Result};

pub mod open;
pub mod query;
pub mod read;
pub mod write;

pub use open::{LaunchTarget, OpenTarget};

/// Run the handler matching `command`.
///
/// `reader` is only consumed by `write`, which receives its payload on the
/// same stream the command arrived on.
///
/// # Errors
///
/// Returns an error only when the connection must close: socket failures,
/// a truncated payload, or an `open` command (never served).
pub async fn dispatch<R, W>(
    command: &Command,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    chunk_size: usize,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let span = info_span!("command", tag = %command.tag(), path = %command.path().display());
    async move {
        match command {
            Command::Exists { path } => query::exists(writer, path).await,
            Command::IsDirectory { path } => query::is_directory(writer, path).await,
            Command::Read { path } => read::read(writer, path, chunk_size).await,
            Command::Write { path } => write::write(reader, writer, path).await,
            Command::Open { .. } => Err(AppError::Protocol(
                "open is not accepted from the daemon".into(),
            )),
        }
    }
    .instrument(span)
    .await
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Build the `Filesystem` error reported to the peer for a failed action.
pub(crate) fn fs_error(action: &str, path: &Path, err: &std::io::Error) -> AppError {
    AppError::Filesystem(format!("cannot {action} {}: {err}", path.display()))
}

/// Send `error` + message, keeping the connection usable.
pub(crate) async fn reply_error<W>(writer: &mut FrameWriter<W>, err: AppError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if err.is_fatal_for_connection() {
        return Err(err);
    }
    let message = err.to_string();
    warn!(%message, "reporting filesystem error to daemon");
    writer.send(Response::Error(message)).await
}

/// Stream exactly `size` bytes of `file` as raw chunks of `chunk_size`.
///
/// Does not flush; callers finish with a `send` or `flush`.
///
/// # Errors
///
/// `AppError::TruncatedStream` if the file yields fewer than `size` bytes,
/// `AppError::Io` on a read failure. Both are fatal for the connection since
/// the length was already announced.
pub(crate) async fn stream_file<W>(
    writer: &mut FrameWriter<W>,
    file: File,
    path: &Path,
    size: u64,
    chunk_size: usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut source = file.take(size);
    let mut sent: u64 = 0;

    loop {
        let mut buf = BytesMut::with_capacity(chunk_size);
        let n = source
            .read_buf(&mut buf)
            .await
            .map_err(|err| AppError::Io(format!("reading {} failed mid-stream: {err}", path.display())))?;
        if n == 0 {
            break;
        }
        sent += n as u64;
        writer.feed(Frame::Chunk(buf.freeze())).await?;
    }

    if sent < size {
        return Err(AppError::TruncatedStream(format!(
            "{} shrank while streaming: sent {sent} of {size} bytes",
            path.display()
        )));
    }

    Ok(())
}
