//! A single agent-to-daemon connection.
//!
//! State machine:
//!
//! ```text
//! Connecting ─► Handshaking ─► Serving ─► Closed
//! ```
//!
//! A `Main` connection announces the launch file (if any) while `Serving`
//! and closes. A `Pool` connection serves commands one at a time, strictly
//! in arrival order, until the daemon closes the socket or sends a tag it
//! does not recognize.

use std::fmt::{Display, Formatter};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::Endpoint;
use crate::handlers::{self, OpenTarget};
use crate::identity::Identity;
use crate::protocol::codec::{self, frame_writer, FrameReader, FrameWriter};
use crate::protocol::command::{Command, CommandTag};
use crate::session::handshake::send_handshake;
use crate::{AppError, Result};

/// What a connection is for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionRole {
    /// One-shot connection carrying the `open` announcement.
    Main,
    /// Long-lived connection serving daemon commands.
    Pool,
}

impl Display for ConnectionRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Pool => f.write_str("pool"),
        }
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    /// Dialing the daemon.
    Connecting,
    /// Connected, handshake not yet sent.
    Handshaking,
    /// Handshake sent; announcing or serving.
    Serving,
    /// Terminal; the socket has been released.
    Closed,
}

/// Why a pool connection stopped serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The daemon closed its end of the socket.
    PeerClosed,
    /// The daemon sent a tag the agent does not serve.
    UnknownCommand(String),
}

/// Summary of a finished serving loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOutcome {
    /// Commands handled before the loop ended.
    pub commands: u64,
    /// Why the loop ended.
    pub reason: CloseReason,
}

/// One socket to the daemon with its framing state.
#[derive(Debug)]
pub struct Connection<R, W> {
    role: ConnectionRole,
    state: ConnectionState,
    chunk_size: usize,
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl Connection<OwnedReadHalf, OwnedWriteHalf> {
    /// Dial `endpoint` over TCP.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Connect` if the daemon cannot be reached. There is
    /// no retry.
    pub async fn connect(endpoint: &Endpoint, role: ConnectionRole, chunk_size: usize) -> Result<Self> {
        debug!(state = ?ConnectionState::Connecting, address = %endpoint.address(), "dialing daemon");
        let stream = TcpStream::connect(endpoint.address())
            .await
            .map_err(|err| AppError::Connect(format!("cannot reach {}: {err}", endpoint.address())))?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%err, "failed to disable nagle");
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self::from_parts(read_half, write_half, role, chunk_size))
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap an already-connected stream pair. The connection starts in
    /// [`ConnectionState::Handshaking`].
    #[must_use]
    pub fn from_parts(reader: R, writer: W, role: ConnectionRole, chunk_size: usize) -> Self {
        Self {
            role,
            state: ConnectionState::Handshaking,
            chunk_size,
            reader: FrameReader::new(reader),
            writer: frame_writer(writer),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// This connection's role.
    #[must_use]
    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Send the handshake and move to `Serving`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if called outside `Handshaking`, or a
    /// socket error.
    pub async fn handshake(&mut self, endpoint: &Endpoint, identity: &Identity) -> Result<()> {
        if self.state != ConnectionState::Handshaking {
            return Err(AppError::Protocol(format!(
                "handshake attempted in state {:?}",
                self.state
            )));
        }
        send_handshake(&mut self.writer, endpoint, self.role, identity).await?;
        self.transition(ConnectionState::Serving);
        Ok(())
    }

    /// Main role: send the `open` announcement, if any.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`handlers::open::open`].
    pub async fn announce(&mut self, target: Option<OpenTarget>) -> Result<()> {
        if let Some(target) = target {
            handlers::open::open(&mut self.writer, target, self.chunk_size).await
        } else {
            debug!("no launch file, nothing to announce");
            Ok(())
        }
    }

    /// Pool role: serve commands until the daemon closes or misbehaves.
    ///
    /// # Errors
    ///
    /// Protocol, truncation, and socket errors end the loop and are returned.
    pub async fn serve(&mut self) -> Result<ServeOutcome> {
        let mut commands = 0_u64;

        loop {
            let Some(tag_line) = self.reader.decode_line().await? else {
                info!(commands, "daemon closed connection");
                return Ok(ServeOutcome {
                    commands,
                    reason: CloseReason::PeerClosed,
                });
            };

            let Some(tag) = CommandTag::parse(&tag_line).filter(|tag| tag.is_served()) else {
                warn!(command = %tag_line, "unknown command, closing connection");
                return Ok(ServeOutcome {
                    commands,
                    reason: CloseReason::UnknownCommand(tag_line),
                });
            };

            let raw_path = self.reader.decode_line().await?.ok_or_else(|| {
                AppError::TruncatedStream(format!("peer closed before path of {tag}"))
            })?;
            let command = Command::from_parts(tag, &raw_path)?;

            handlers::dispatch(&command, &mut self.reader, &mut self.writer, self.chunk_size)
                .await?;
            commands += 1;
        }
    }

    /// Flush and shut down the socket, entering `Closed`.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Err(err) = codec::close(&mut self.writer).await {
            debug!(%err, "socket shutdown failed");
        }
        self.transition(ConnectionState::Closed);
    }

    /// Drive the connection through its whole lifecycle.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection early. The socket is
    /// closed either way.
    pub async fn run(
        mut self,
        endpoint: &Endpoint,
        identity: &Identity,
        target: Option<OpenTarget>,
    ) -> Result<()> {
        let result = self.run_inner(endpoint, identity, target).await;
        self.close().await;
        result
    }

    async fn run_inner(
        &mut self,
        endpoint: &Endpoint,
        identity: &Identity,
        target: Option<OpenTarget>,
    ) -> Result<()> {
        self.handshake(endpoint, identity).await?;
        match self.role {
            ConnectionRole::Main => self.announce(target).await,
            ConnectionRole::Pool => self.serve().await.map(|outcome| {
                debug!(commands = outcome.commands, reason = ?outcome.reason, "serving loop ended");
            }),
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "connection state change");
        self.state = next;
    }
}
