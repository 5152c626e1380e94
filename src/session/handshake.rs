//! Connection handshake.
//!
//! Every connection opens with:
//!
//! ```text
//! <protocol-version>\n
//! main\n            (main connection only)
//! ident\n
//! <user>@<host>\n
//! ```
//!
//! There is no reply and no negotiation; the daemon trusts what it is told.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::config::Endpoint;
use crate::identity::Identity;
use crate::protocol::codec::{self, Frame, FrameWriter};
use crate::session::connection::ConnectionRole;
use crate::Result;

/// Marker line identifying the main connection.
pub const MAIN_MARKER: &str = "main";

/// Tag line preceding the identity.
pub const IDENT_TAG: &str = "ident";

/// Write the handshake for `role` and flush it.
///
/// # Errors
///
/// Returns `AppError::Io` if the socket write fails.
pub async fn send_handshake<W>(
    writer: &mut FrameWriter<W>,
    endpoint: &Endpoint,
    role: ConnectionRole,
    identity: &Identity,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.feed(Frame::Line(endpoint.version.clone())).await?;
    if role == ConnectionRole::Main {
        writer.feed(Frame::Line(MAIN_MARKER.to_owned())).await?;
    }
    writer.feed(Frame::Line(IDENT_TAG.to_owned())).await?;
    writer.feed(Frame::Line(identity.as_str().to_owned())).await?;
    codec::flush(writer).await?;

    debug!(version = %endpoint.version, %identity, "handshake sent");
    Ok(())
}
