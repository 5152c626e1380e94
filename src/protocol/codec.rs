//! Line + raw-payload codec for the daemon socket.
//!
//! Control traffic is newline-terminated UTF-8 text; file contents travel as
//! raw bytes whose length was announced on a preceding line. [`WireCodec`]
//! wraps [`tokio_util::codec::LinesCodec`] for the text side and switches to
//! raw mode for exactly the announced number of bytes when told to via
//! [`WireCodec::expect_payload`].
//!
//! # Usage
//!
//! Read through [`FrameReader`], which owns a [`FramedRead`] over the socket
//! read half. Write through a [`FrameWriter`] (a [`FramedWrite`] using the
//! same codec) with [`futures_util::SinkExt`].

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum control line length accepted by the decoder: 1 MiB.
///
/// Paths and length lines are tiny; anything longer means the peer is out of
/// sync or misbehaving, and is reported as [`AppError::Protocol`].
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One decoded or encoded unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A control line, without its trailing newline.
    Line(String),
    /// Raw payload bytes belonging to an announced length.
    Chunk(Bytes),
}

/// Codec for the agent/daemon stream.
///
/// # Decoder
///
/// In line mode, yields [`Frame::Line`] for each `\n`-terminated line. After
/// [`expect_payload`](Self::expect_payload) it yields [`Frame::Chunk`]s as
/// bytes arrive, never more than the outstanding count, then falls back to
/// line mode. EOF with payload outstanding is [`AppError::TruncatedStream`].
///
/// # Encoder
///
/// Lines are written as `item\n` with no escaping. Chunks are copied as-is.
#[derive(Debug)]
pub struct WireCodec {
    lines: LinesCodec,
    payload_remaining: u64,
}

impl WireCodec {
    /// Create a codec in line mode with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            payload_remaining: 0,
        }
    }

    /// Switch the decoder to raw mode for the next `len` bytes.
    pub fn expect_payload(&mut self, len: u64) {
        self.payload_remaining = len;
    }

    /// Payload bytes still owed by the peer.
    #[must_use]
    pub fn payload_remaining(&self) -> u64 {
        self.payload_remaining
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.payload_remaining > 0 {
            if src.is_empty() {
                return Ok(None);
            }
            let take = usize::try_from(self.payload_remaining)
                .map_or(src.len(), |remaining| remaining.min(src.len()));
            self.payload_remaining -= take as u64;
            return Ok(Some(Frame::Chunk(src.split_to(take).freeze())));
        }

        let line = self.lines.decode(src).map_err(map_codec_error)?;
        Ok(line.map(Frame::Line))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if self.payload_remaining > 0 {
            if src.is_empty() {
                return Err(AppError::TruncatedStream(format!(
                    "peer closed with {} payload bytes outstanding",
                    self.payload_remaining
                )));
            }
            return self.decode(src);
        }

        let line = self.lines.decode_eof(src).map_err(map_codec_error)?;
        Ok(line.map(Frame::Line))
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = AppError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        match item {
            Frame::Line(line) => self.encode_line(&line, dst),
            Frame::Chunk(bytes) => {
                dst.extend_from_slice(&bytes);
                Ok(())
            }
        }
    }
}

impl WireCodec {
    /// Append `text` plus a newline to `dst`.
    pub(crate) fn encode_line(&mut self, text: &str, dst: &mut BytesMut) -> Result<()> {
        self.lines.encode(text, dst).map_err(map_codec_error)
    }
}

/// Write half of a connection.
pub type FrameWriter<W> = FramedWrite<W, WireCodec>;

/// Wrap `writer` in a [`FrameWriter`].
#[must_use]
pub fn frame_writer<W: AsyncWrite>(writer: W) -> FrameWriter<W> {
    FramedWrite::new(writer, WireCodec::new())
}

/// Flush everything fed to `writer`.
///
/// `FrameWriter` is a sink for several item types, so the plain
/// `SinkExt::flush` call cannot pick one on its own.
///
/// # Errors
///
/// Returns `AppError::Io` if the socket write fails.
pub async fn flush<W: AsyncWrite + Unpin>(writer: &mut FrameWriter<W>) -> Result<()> {
    SinkExt::<Frame>::flush(writer).await
}

/// Flush and shut down the write half.
///
/// # Errors
///
/// Returns `AppError::Io` if the socket write or shutdown fails.
pub async fn close<W: AsyncWrite + Unpin>(writer: &mut FrameWriter<W>) -> Result<()> {
    SinkExt::<Frame>::close(writer).await
}

/// Read half of a connection.
///
/// All reads go through one [`FramedRead`] so bytes buffered past a line
/// boundary are never lost when switching between lines and payload.
#[derive(Debug)]
pub struct FrameReader<R> {
    framed: FramedRead<R, WireCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap `reader` with a fresh [`WireCodec`].
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            framed: FramedRead::new(reader, WireCodec::new()),
        }
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// `AppError::Protocol` for an oversized or non-UTF-8 line,
    /// `AppError::Io` for socket failures.
    pub async fn decode_line(&mut self) -> Result<Option<String>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(Frame::Line(line))) => Ok(Some(line)),
            Some(Ok(Frame::Chunk(_))) => Err(AppError::Protocol(
                "payload bytes received while expecting a line".into(),
            )),
            Some(Err(err)) => Err(err),
        }
    }

    /// Read a length line followed by exactly that many raw bytes.
    ///
    /// # Errors
    ///
    /// `AppError::Protocol` if the length line is not a non-negative integer,
    /// `AppError::TruncatedStream` if the stream ends before the line or the
    /// payload is complete.
    pub async fn decode_length_prefixed(&mut self) -> Result<Bytes> {
        let line = self.decode_line().await?.ok_or_else(|| {
            AppError::TruncatedStream("stream ended before length line".into())
        })?;
        let len = parse_length(&line)?;

        let mut payload = BytesMut::new();
        self.begin_payload(len);
        while let Some(chunk) = self.next_chunk().await? {
            payload.extend_from_slice(&chunk);
        }
        Ok(payload.freeze())
    }

    /// Announce that the next `len` bytes are raw payload.
    ///
    /// Drain them with [`next_chunk`](Self::next_chunk) before reading lines
    /// again.
    pub fn begin_payload(&mut self, len: u64) {
        self.framed.decoder_mut().expect_payload(len);
    }

    /// Next slice of the current payload, or `Ok(None)` once it is complete.
    ///
    /// # Errors
    ///
    /// `AppError::TruncatedStream` if the peer closes mid-payload.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.framed.decoder().payload_remaining() == 0 {
            return Ok(None);
        }

        match self.framed.next().await {
            Some(Ok(Frame::Chunk(bytes))) => Ok(Some(bytes)),
            Some(Ok(Frame::Line(_))) => Err(AppError::Protocol(
                "line received while expecting payload".into(),
            )),
            Some(Err(err)) => Err(err),
            None => Err(AppError::TruncatedStream(format!(
                "stream ended with {} payload bytes outstanding",
                self.framed.decoder().payload_remaining()
            ))),
        }
    }
}

/// Parse a byte-count line.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns `AppError::Protocol` for anything but a non-negative integer.
pub fn parse_length(line: &str) -> Result<u64> {
    line.trim()
        .parse::<u64>()
        .map_err(|err| AppError::Protocol(format!("invalid length line {line:?}: {err}")))
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) if io_err.kind() == std::io::ErrorKind::InvalidData => {
            AppError::Protocol(format!("line is not valid utf-8: {io_err}"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
