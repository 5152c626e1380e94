//! `write` handler: receive a chunked file from the daemon.
//!
//! ```text
//! agent:  ok\n                      (or error\n<message>\n and stop)
//! daemon: <count>\n<count bytes>    (repeated)
//! daemon: 0\n                       (end of transfer)
//! ```

use std::path::Path;

use futures_util::SinkExt;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::handlers::{fs_error, reply_error};
use crate::protocol::codec::{parse_length, FrameReader, FrameWriter};
use crate::protocol::command::Response;
use crate::{AppError, Result};

/// Create or truncate `path`, acknowledge, then append the daemon's chunks.
///
/// A count of `0` or an unparseable count line ends the transfer; the
/// connection keeps serving afterwards. If a disk write fails mid-transfer
/// the remaining chunks are still consumed (and dropped) so the stream stays
/// framed. The file is flushed and closed on every path out.
///
/// # Errors
///
/// `AppError::TruncatedStream` if the daemon closes mid-transfer, or a
/// socket error. Both end the connection.
pub async fn write<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    path: &Path,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut file = match File::create(path).await {
        Ok(file) => file,
        Err(err) => return reply_error(writer, fs_error("open", path, &err)).await,
    };
    writer.send(Response::Ok).await?;

    let mut sink = ChunkSink::default();
    let outcome = receive_chunks(reader, &mut file, &mut sink, path).await;

    if let Err(err) = file.flush().await {
        warn!(%err, "flushing received file failed");
    }
    drop(file);

    match &outcome {
        Ok(()) if sink.failed => warn!(bytes = sink.written, "write transfer ended with dropped chunks"),
        Ok(()) => info!(bytes = sink.written, "file received from daemon"),
        Err(err) => warn!(%err, bytes = sink.written, "write transfer aborted"),
    }
    outcome
}

/// Progress of one transfer.
#[derive(Debug, Default)]
struct ChunkSink {
    written: u64,
    failed: bool,
}

async fn receive_chunks<R>(
    reader: &mut FrameReader<R>,
    file: &mut File,
    sink: &mut ChunkSink,
    path: &Path,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = reader.decode_line().await?.ok_or_else(|| {
            AppError::TruncatedStream("peer closed during write transfer".into())
        })?;

        let count = match parse_length(&line) {
            Ok(0) => {
                debug!("end of transfer");
                return Ok(());
            }
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "unparseable chunk count, ending transfer");
                return Ok(());
            }
        };

        reader.begin_payload(count);
        while let Some(chunk) = reader.next_chunk().await? {
            if sink.failed {
                continue;
            }
            match file.write_all(&chunk).await {
                Ok(()) => sink.written += chunk.len() as u64,
                Err(err) => {
                    warn!(err = %fs_error("write", path, &err), "dropping remaining chunks");
                    sink.failed = true;
                }
            }
        }
    }
}
