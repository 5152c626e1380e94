//! `exists` and `is_directory` handlers.
//!
//! Both answer with a single `true` / `false` line and never fail on the
//! filesystem side: any stat error counts as `false`.

use std::path::Path;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::protocol::codec::FrameWriter;
use crate::protocol::command::Response;
use crate::Result;

/// Answer whether `path` exists.
///
/// # Errors
///
/// Returns `AppError::Io` only if the response cannot be written.
pub async fn exists<W>(writer: &mut FrameWriter<W>, path: &Path) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let found = tokio::fs::try_exists(path).await.unwrap_or(false);
    debug!(found, "exists");
    writer.send(Response::Boolean(found)).await
}

/// Answer whether `path` is a directory (following symlinks).
///
/// # Errors
///
/// Returns `AppError::Io` only if the response cannot be written.
pub async fn is_directory<W>(writer: &mut FrameWriter<W>, path: &Path) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let is_dir = tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir());
    debug!(is_dir, "is_directory");
    writer.send(Response::Boolean(is_dir)).await
}
