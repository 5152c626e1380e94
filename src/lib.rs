#![forbid(unsafe_code)]

//! Remote file access agent.
//!
//! Connects to an editor daemon over TCP and lets it open, read, write, and
//! stat files on this machine. See [`session::SessionManager`] for the
//! connection layout and [`protocol`] for the wire format.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod protocol;
pub mod session;

pub use config::{AgentConfig, Endpoint};
pub use errors::{AppError, Result};
pub use identity::Identity;
