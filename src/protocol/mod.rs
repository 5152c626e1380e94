//! Wire protocol spoken with the daemon.
//!
//! - `codec`: [`WireCodec`](codec::WireCodec) framing for newline-terminated
//!   control lines and length-announced raw payloads.
//! - `command`: command tags, commands, response headers, and the path
//!   normalization step applied to every inbound path.

pub mod codec;
pub mod command;

pub use codec::{Frame, FrameReader, FrameWriter, WireCodec};
pub use command::{Command, CommandTag, Response};
