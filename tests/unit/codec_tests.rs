//! Unit tests for the line + payload codec.
//!
//! Covers:
//! - single and batched lines
//! - partial delivery buffered until newline
//! - payload mode yields at most the announced bytes, then lines again
//! - EOF with payload outstanding is a truncated stream
//! - oversized line is a protocol error
//! - length-prefixed reads over a real async stream, including short writes

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, Encoder};

use remote_file_agent::protocol::codec::{parse_length, Frame, FrameReader, WireCodec, MAX_LINE_BYTES};
use remote_file_agent::AppError;

#[test]
fn single_line_decodes_without_newline() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from("read\n");

    let frame = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(frame, Some(Frame::Line("read".to_owned())));
    assert!(buf.is_empty());
}

#[test]
fn batched_lines_are_each_decoded() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from("exists\n/tmp/a\n");

    let first = codec.decode(&mut buf).expect("first decode");
    let second = codec.decode(&mut buf).expect("second decode");
    let third = codec.decode(&mut buf).expect("third decode");

    assert_eq!(first, Some(Frame::Line("exists".to_owned())));
    assert_eq!(second, Some(Frame::Line("/tmp/a".to_owned())));
    assert!(third.is_none(), "no further lines must be present");
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from("is_dir");

    assert!(codec.decode(&mut buf).expect("partial decode").is_none());

    buf.extend_from_slice(b"ectory\n");
    let frame = codec.decode(&mut buf).expect("complete decode");
    assert_eq!(frame, Some(Frame::Line("is_directory".to_owned())));
}

#[test]
fn payload_mode_stops_at_announced_length() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from("hello0\n");
    codec.expect_payload(5);

    let chunk = codec.decode(&mut buf).expect("payload decode");
    assert_eq!(chunk, Some(Frame::Chunk(Bytes::from_static(b"hello"))));
    assert_eq!(codec.payload_remaining(), 0);

    let line = codec.decode(&mut buf).expect("line after payload");
    assert_eq!(line, Some(Frame::Line("0".to_owned())));
}

#[test]
fn payload_tolerates_partial_delivery() {
    let mut codec = WireCodec::new();
    codec.expect_payload(6);

    let mut buf = BytesMut::from("abc");
    let first = codec.decode(&mut buf).expect("first chunk");
    assert_eq!(first, Some(Frame::Chunk(Bytes::from_static(b"abc"))));
    assert_eq!(codec.payload_remaining(), 3);

    assert!(codec.decode(&mut buf).expect("empty buffer").is_none());

    buf.extend_from_slice(b"def");
    let second = codec.decode(&mut buf).expect("second chunk");
    assert_eq!(second, Some(Frame::Chunk(Bytes::from_static(b"def"))));
}

#[test]
fn payload_bytes_that_look_like_newlines_are_not_split() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from("a\nb\n");
    codec.expect_payload(4);

    let chunk = codec.decode(&mut buf).expect("payload decode");
    assert_eq!(chunk, Some(Frame::Chunk(Bytes::from_static(b"a\nb\n"))));
}

#[test]
fn eof_with_payload_outstanding_is_truncated() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::new();
    codec.expect_payload(10);

    let result = codec.decode_eof(&mut buf);

    match result {
        Err(AppError::TruncatedStream(msg)) => assert!(msg.contains("10"), "got: {msg}"),
        other => panic!("expected TruncatedStream, got: {other:?}"),
    }
}

#[test]
fn max_line_length_exceeded_returns_protocol_error() {
    let mut codec = WireCodec::new();
    let big_line = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big_line.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Protocol(msg)) => assert!(msg.contains("line too long"), "got: {msg}"),
        other => panic!("expected Protocol error, got: {other:?}"),
    }
}

#[test]
fn encoded_lines_are_newline_terminated_and_chunks_raw() {
    let mut codec = WireCodec::new();
    let mut dst = BytesMut::new();

    codec
        .encode(Frame::Line("ident".to_owned()), &mut dst)
        .expect("encode line");
    codec
        .encode(Frame::Chunk(Bytes::from_static(b"\x00\x01")), &mut dst)
        .expect("encode chunk");

    assert_eq!(&dst[..], b"ident\n\x00\x01");
}

#[test]
fn parse_length_accepts_counts_and_rejects_garbage() {
    assert_eq!(parse_length("42").expect("plain"), 42);
    assert_eq!(parse_length(" 7 ").expect("padded"), 7);
    assert_eq!(parse_length("0").expect("zero"), 0);

    for bad in ["", "-1", "ten", "1.5"] {
        assert!(
            matches!(parse_length(bad), Err(AppError::Protocol(_))),
            "{bad:?} must be rejected"
        );
    }
}

#[tokio::test]
async fn reader_returns_none_on_immediate_eof() {
    let empty: &[u8] = b"";
    let mut reader = FrameReader::new(empty);

    let line = reader.decode_line().await.expect("eof is not an error");
    assert!(line.is_none());
}

#[tokio::test]
async fn reader_decodes_length_prefixed_across_short_writes() {
    let (mut tx, rx) = tokio::io::duplex(8);
    let mut reader = FrameReader::new(rx);

    let writer = tokio::spawn(async move {
        tx.write_all(b"12\n").await.expect("write length");
        tx.write_all(b"hello ").await.expect("write first half");
        tx.write_all(b"world!next\n").await.expect("write rest");
    });

    let payload = reader
        .decode_length_prefixed()
        .await
        .expect("length-prefixed read");
    assert_eq!(&payload[..], b"hello world!");

    let next = reader.decode_line().await.expect("line after payload");
    assert_eq!(next.as_deref(), Some("next"));

    writer.await.expect("writer task");
}

#[tokio::test]
async fn reader_reports_invalid_length_line() {
    let input: &[u8] = b"lots\nabc";
    let mut reader = FrameReader::new(input);

    let result = reader.decode_length_prefixed().await;
    assert!(
        matches!(result, Err(AppError::Protocol(_))),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn reader_reports_truncated_payload() {
    let input: &[u8] = b"10\nabc";
    let mut reader = FrameReader::new(input);

    let result = reader.decode_length_prefixed().await;
    assert!(
        matches!(result, Err(AppError::TruncatedStream(_))),
        "got: {result:?}"
    );
}
