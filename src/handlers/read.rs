//! `read` handler: stream a local file to the daemon.
//!
//! Response is either
//! `<size>\n <size raw bytes> 0\n` or `error\n <message>\n`, never a mix:
//! the file is stat'ed and opened before the first response byte.

use std::path::Path;

use futures_util::SinkExt;
use tokio::fs::File;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use crate::handlers::{fs_error, reply_error, stream_file};
use crate::protocol::codec::FrameWriter;
use crate::protocol::command::Response;
use crate::{AppError, Result};

/// Stream `path` to the daemon in `chunk_size` pieces.
///
/// # Errors
///
/// Filesystem failures before the size line become an `error` response and
/// return `Ok(())`. Once the size is announced, a short or failing read is
/// returned as `AppError::TruncatedStream` / `AppError::Io` and the
/// connection must close.
pub async fn read<W>(writer: &mut FrameWriter<W>, path: &Path, chunk_size: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (file, size) = match open_for_read(path).await {
        Ok(opened) => opened,
        Err(err) => return reply_error(writer, err).await,
    };

    debug!(size, "streaming file");
    writer.feed(Response::FileStream { length: size }).await?;
    stream_file(writer, file, path, size, chunk_size).await?;
    writer.send(Response::EndOfStream).await?;

    info!(bytes = size, "file sent to daemon");
    Ok(())
}

/// Stat and open `path`, yielding the handle and the size to announce.
async fn open_for_read(path: &Path) -> Result<(File, u64)> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|err| fs_error("stat", path, &err))?;
    if meta.is_dir() {
        return Err(AppError::Filesystem(format!(
            "cannot read {}: is a directory",
            path.display()
        )));
    }

    let file = File::open(path)
        .await
        .map_err(|err| fs_error("open", path, &err))?;
    Ok((file, meta.len()))
}
