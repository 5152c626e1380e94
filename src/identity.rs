//! Local identity announced to the daemon.
//!
//! The identity is `<user>@<host>`. On Unix the passwd database and
//! `gethostname(2)` are consulted first; environment variables are the
//! fallback everywhere.

use std::env;
use std::fmt::{Display, Formatter};

use tracing::warn;

use crate::{AppError, Result};

/// `<user>@<host>` string sent once per connection after the `ident` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    /// Build an identity from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if either part is empty or contains a
    /// newline, which would break line framing.
    pub fn new(user: &str, host: &str) -> Result<Self> {
        for (label, part) in [("user", user), ("host", host)] {
            if part.is_empty() {
                return Err(AppError::Config(format!("{label} name is empty")));
            }
            if part.contains('\n') || part.contains('\r') {
                return Err(AppError::Config(format!(
                    "{label} name contains a line break"
                )));
            }
        }
        Ok(Self(format!("{user}@{host}")))
    }

    /// Detect the identity of the current process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the user or host name cannot be
    /// determined.
    pub fn detect() -> Result<Self> {
        let user = system_user_name()
            .or_else(|| env_first(&["USER", "USERNAME", "LOGNAME"]))
            .ok_or_else(|| AppError::Config("cannot determine local user name".into()))?;
        let host = system_host_name()
            .or_else(|| env_first(&["HOSTNAME", "COMPUTERNAME"]))
            .ok_or_else(|| AppError::Config("cannot determine local host name".into()))?;
        Self::new(&user, &host)
    }

    /// The identity line content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
}

#[cfg(unix)]
fn system_user_name() -> Option<String> {
    match nix::unistd::User::from_uid(nix::unistd::getuid()) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) => None,
        Err(err) => {
            warn!(%err, "passwd lookup failed, trying env var");
            None
        }
    }
}

#[cfg(unix)]
fn system_host_name() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => name.into_string().ok().filter(|name| !name.is_empty()),
        Err(err) => {
            warn!(%err, "gethostname failed, trying env var");
            None
        }
    }
}

#[cfg(not(unix))]
fn system_user_name() -> Option<String> {
    None
}

#[cfg(not(unix))]
fn system_host_name() -> Option<String> {
    warn!("no native host name lookup on this platform, using env var");
    None
}
