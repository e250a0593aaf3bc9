// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for subscriber session cleanup.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use crate::core::metrics;
use crate::core::state::ServerState;

/// An RAII guard ensuring a session is detached from the Connection Registry
/// and its push channel deregistered whenever a connection's handler scope
/// is exited, however it exits. The cleanup is synchronous-only: registry
/// removal is a plain `DashMap` operation, so it
/// never needs to block on I/O; publishing the resulting event onto the bus
/// is handed off to a spawned task since `Drop` cannot `.await`.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    session_id: Option<String>,
    addr: SocketAddr,
}

impl ConnectionGuard {
    pub(crate) fn new(state: Arc<ServerState>, addr: SocketAddr) -> Self {
        Self {
            state,
            session_id: None,
            addr,
        }
    }

    /// Records the session id assigned on this connection's first pull, so
    /// `Drop` knows what to detach.
    pub(crate) fn set_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        debug!(
            "ConnectionGuard dropping, detaching session {} for {}",
            session_id, self.addr
        );

        self.state.unregister_session_channel(&session_id);
        let event = self.state.registry.detach(&session_id);
        metrics::CONNECTED_SESSIONS.dec();

        let backend = self.state.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.publish(event.to_bus_event()).await {
                tracing::warn!("failed to publish detach event for {session_id}: {e}");
            }
        });
    }
}
