//! Integration tests for the connection state machine and handshake.
//!
//! Validates:
//! - handshake lines for pool and main roles
//! - main connection `open` announcement for new and existing files
//! - pool loop termination on EOF and on unknown commands
//! - state transitions Handshaking → Serving → Closed

use std::path::PathBuf;

use remote_file_agent::handlers::OpenTarget;
use remote_file_agent::protocol::Command;
use remote_file_agent::session::{CloseReason, Connection, ConnectionRole, ConnectionState};
use remote_file_agent::AppError;

use super::test_helpers::{
    spawn_connection, spawn_pool, test_endpoint, test_identity, FakeDaemon, TEST_CHUNK_SIZE,
};

#[tokio::test]
async fn pool_handshake_has_no_main_marker() {
    let (mut daemon, _handle) = spawn_connection(ConnectionRole::Pool, None);

    assert_eq!(daemon.expect_line().await, "1");
    assert_eq!(daemon.expect_line().await, "ident");
    assert_eq!(daemon.expect_line().await, "alice@workstation");
}

#[tokio::test]
async fn main_without_target_handshakes_then_closes() {
    let (mut daemon, handle) = spawn_connection(ConnectionRole::Main, None);

    daemon.expect_handshake(ConnectionRole::Main).await;
    daemon.expect_eof().await;
    handle.await.expect("task").expect("clean close");
}

#[tokio::test]
async fn main_announces_new_file_without_size() {
    let target = OpenTarget::new_file(PathBuf::from("/tmp/new.txt"));
    let (mut daemon, handle) = spawn_connection(ConnectionRole::Main, Some(target));

    daemon.expect_handshake(ConnectionRole::Main).await;
    assert_eq!(daemon.expect_line().await, "open");
    assert_eq!(daemon.expect_line().await, "/tmp/new.txt");
    daemon.expect_eof().await;
    handle.await.expect("task").expect("clean close");
}

#[tokio::test]
async fn main_announces_existing_file_with_contents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("existing.txt");
    std::fs::write(&path, b"0123456789").expect("write file");
    let target = OpenTarget::open_existing(path.clone()).expect("open launch file");
    let (mut daemon, handle) = spawn_connection(ConnectionRole::Main, Some(target));

    daemon.expect_handshake(ConnectionRole::Main).await;
    assert_eq!(daemon.expect_line().await, "open");
    assert_eq!(daemon.expect_line().await, path.to_string_lossy());
    let payload = daemon
        .reader
        .decode_length_prefixed()
        .await
        .expect("size line and payload");
    assert_eq!(&payload[..], b"0123456789");
    daemon.expect_eof().await;
    handle.await.expect("task").expect("clean close");
}

#[tokio::test]
async fn main_fails_when_file_shrank_below_announced_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shrunk.txt");
    std::fs::write(&path, b"0123456789").expect("write file");
    let target = OpenTarget::open_existing(path.clone()).expect("open launch file");
    assert_eq!(target.size(), Some(10));
    std::fs::write(&path, b"abc").expect("shrink file");
    let (mut daemon, handle) = spawn_connection(ConnectionRole::Main, Some(target));

    daemon.expect_handshake(ConnectionRole::Main).await;
    let result = handle.await.expect("task");
    assert!(
        matches!(result, Err(AppError::TruncatedStream(_))),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn pool_ends_cleanly_when_daemon_closes() {
    let (mut daemon, handle) = spawn_pool().await;

    daemon.close().await;

    handle.await.expect("task").expect("peer close is not an error");
}

#[tokio::test]
async fn unknown_command_closes_connection() {
    let (mut daemon, handle) = spawn_pool().await;

    daemon.send_line("delete").await;

    daemon.expect_eof().await;
    handle.await.expect("task").expect("unknown command is a clean close");
}

#[tokio::test]
async fn open_from_daemon_is_treated_as_unknown() {
    let (mut daemon, handle) = spawn_pool().await;

    daemon.send_line("open").await;

    daemon.expect_eof().await;
    handle.await.expect("task").expect("clean close");
}

#[tokio::test]
async fn eof_before_path_line_is_truncation() {
    let (mut daemon, handle) = spawn_pool().await;

    daemon.send_line("read").await;
    daemon.close().await;

    let result = handle.await.expect("task");
    assert!(
        matches!(result, Err(AppError::TruncatedStream(_))),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn serve_counts_commands_until_peer_closes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (agent_side, daemon_side) = tokio::io::duplex(4096);
    let (agent_read, agent_write) = tokio::io::split(agent_side);
    let mut connection =
        Connection::from_parts(agent_read, agent_write, ConnectionRole::Pool, TEST_CHUNK_SIZE);

    let (daemon_read, daemon_write) = tokio::io::split(daemon_side);
    let mut daemon = FakeDaemon::new(daemon_read, daemon_write);

    connection
        .handshake(&test_endpoint(), &test_identity())
        .await
        .expect("handshake");
    daemon.expect_handshake(ConnectionRole::Pool).await;

    let serve = tokio::spawn(async move { connection.serve().await });
    for _ in 0..2 {
        daemon
            .send(Command::Exists {
                path: dir.path().to_path_buf(),
            })
            .await;
        assert_eq!(daemon.expect_line().await, "true");
    }
    daemon.close().await;

    let outcome = serve.await.expect("task").expect("serve");
    assert_eq!(outcome.commands, 2);
    assert_eq!(outcome.reason, CloseReason::PeerClosed);
}

#[tokio::test]
async fn state_moves_through_lifecycle() {
    let (agent_side, _daemon_side) = tokio::io::duplex(4096);
    let (agent_read, agent_write) = tokio::io::split(agent_side);
    let mut connection =
        Connection::from_parts(agent_read, agent_write, ConnectionRole::Main, TEST_CHUNK_SIZE);

    assert_eq!(connection.state(), ConnectionState::Handshaking);
    assert_eq!(connection.role(), ConnectionRole::Main);

    connection
        .handshake(&test_endpoint(), &test_identity())
        .await
        .expect("handshake");
    assert_eq!(connection.state(), ConnectionState::Serving);

    let again = connection.handshake(&test_endpoint(), &test_identity()).await;
    assert!(matches!(again, Err(AppError::Protocol(_))));

    connection.close().await;
    assert_eq!(connection.state(), ConnectionState::Closed);
}
