// src/connection/session.rs

//! Defines the state associated with a single subscriber session.

/// Holds the state specific to a single subscribe-channel connection.
#[derive(Debug, Default)]
pub struct SessionState {
    /// The opaque session id assigned on this connection's first pull, once
    /// the Connection Registry has attached it. `None` until then.
    pub session_id: Option<String>,
    /// Set once a subscribe-time token has been checked against the
    /// `AuthManager`, when `OPEN_CLIENT_AUTH_TOKEN` is enabled. Connections
    /// opened while auth is disabled are considered authenticated from the
    /// start.
    pub authenticated: bool,
}

impl SessionState {
    pub(crate) fn new(auth_required: bool) -> Self {
        Self {
            session_id: None,
            authenticated: !auth_required,
        }
    }
}
