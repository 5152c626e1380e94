//! Session manager: the set of connections for one agent invocation.
//!
//! Spawns one `Main` connection and `pool_size` `Pool` connections on a
//! [`TaskTracker`]. Connections share only the immutable endpoint and
//! identity. A pool connection that closes is not replaced.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{AgentConfig, Endpoint};
use crate::handlers::OpenTarget;
use crate::identity::Identity;
use crate::session::connection::{Connection, ConnectionRole};
use crate::{AppError, Result};

/// Owns the immutable per-process settings and starts connection tasks.
#[derive(Debug, Clone)]
pub struct SessionManager {
    endpoint: Arc<Endpoint>,
    identity: Arc<Identity>,
    pool_size: u32,
    chunk_size: usize,
}

impl SessionManager {
    /// Build a manager from validated configuration.
    #[must_use]
    pub fn new(config: &AgentConfig, identity: Identity) -> Self {
        Self {
            endpoint: Arc::new(config.endpoint()),
            identity: Arc::new(identity),
            pool_size: config.pool_size,
            chunk_size: config.chunk_size,
        }
    }

    /// Spawn the main connection and the pool.
    ///
    /// Must be called from within a tokio runtime. Every task stops when
    /// `cancel` fires, dropping (and so closing) its socket.
    #[must_use]
    pub fn start(&self, target: Option<OpenTarget>, cancel: CancellationToken) -> SessionHandle {
        let tracker = TaskTracker::new();

        info!(
            address = %self.endpoint.address(),
            pool_size = self.pool_size,
            identity = %self.identity,
            "starting session"
        );

        self.spawn_connection(&tracker, ConnectionRole::Main, 0, target, cancel.clone());
        for slot in 1..=self.pool_size {
            self.spawn_connection(&tracker, ConnectionRole::Pool, slot, None, cancel.clone());
        }
        tracker.close();

        SessionHandle { tracker, cancel }
    }

    fn spawn_connection(
        &self,
        tracker: &TaskTracker,
        role: ConnectionRole,
        slot: u32,
        target: Option<OpenTarget>,
        cancel: CancellationToken,
    ) {
        let endpoint = Arc::clone(&self.endpoint);
        let identity = Arc::clone(&self.identity);
        let chunk_size = self.chunk_size;
        let span = info_span!("connection", %role, slot);

        tracker.spawn(
            async move {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        debug!("cancellation received, releasing socket");
                    }

                    result = run_connection(&endpoint, &identity, role, target, chunk_size) => {
                        match result {
                            Ok(()) => info!("connection closed"),
                            Err(err @ AppError::Connect(_)) => warn!(%err, "connection failed"),
                            Err(err) => warn!(%err, "connection ended with error"),
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}

async fn run_connection(
    endpoint: &Endpoint,
    identity: &Identity,
    role: ConnectionRole,
    target: Option<OpenTarget>,
    chunk_size: usize,
) -> Result<()> {
    let connection = Connection::connect(endpoint, role, chunk_size).await?;
    connection.run(endpoint, identity, target).await
}

/// Handle to the running connection tasks.
#[derive(Debug)]
pub struct SessionHandle {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Wait until every connection task has finished on its own.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Cancel every connection task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }

    /// Connection tasks still running.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.len()
    }
}
