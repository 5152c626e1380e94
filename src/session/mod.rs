//! Connections to the daemon.
//!
//! - `handshake`: version / `main` / identity lines sent on connect.
//! - `connection`: one socket's lifecycle and the pool serving loop.
//! - `manager`: spawns the main connection plus the worker pool and joins
//!   them on shutdown.

pub mod connection;
pub mod handshake;
pub mod manager;

pub use connection::{CloseReason, Connection, ConnectionRole, ConnectionState, ServeOutcome};
pub use manager::{SessionHandle, SessionManager};
