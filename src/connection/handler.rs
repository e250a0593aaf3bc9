// src/connection/handler.rs

//! Defines the `ConnectionHandler`, which drives one subscribe-channel
//! connection: decode pull frames, resolve through the Push Engine, and
//! forward both the direct reply and any later proactively-pushed frame
//! onto the same wire.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::guard::ConnectionGuard;
use super::session::SessionState;
use crate::core::errors::LivecfgError;
use crate::core::metrics;
use crate::core::protocol::{ConfigFrameCodec, ErrorFrame, PullFrame, PushFrame, ServerFrame};
use crate::core::push::ResponseMode;
use crate::core::state::ServerState;

const PUSH_CHANNEL_CAPACITY: usize = 16;

/// The next step for the connection's main loop to take.
enum NextAction {
    Continue,
    ExitLoop,
}

/// Manages the full lifecycle of a subscribe-channel connection.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, ConfigFrameCodec>,
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_rx: broadcast::Receiver<()>,
    session: SessionState,
    push_tx: mpsc::Sender<PushFrame>,
    push_rx: mpsc::Receiver<PushFrame>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let auth_required = state.config.open_client_auth_token;
        let (push_tx, push_rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            framed: Framed::new(socket, ConfigFrameCodec),
            addr,
            state,
            shutdown_rx,
            session: SessionState::new(auth_required),
            push_tx,
            push_rx,
        }
    }

    /// The main event loop: decode pull frames, service the shutdown signal,
    /// and drain proactive pushes routed here from the Bus listener.
    pub async fn run(&mut self) {
        let mut guard = ConnectionGuard::new(self.state.clone(), self.addr);
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("subscribe connection {} received shutdown signal", self.addr);
                    let frame = ServerFrame::Error(ErrorFrame {
                        code: 503,
                        error_msg: "server is shutting down".to_string(),
                    });
                    let _ = self.framed.send(frame).await;
                    break;
                }
                pushed = self.push_rx.recv() => {
                    let Some(frame) = pushed else { continue };
                    metrics::PUSHES_TOTAL.with_label_values(&["reply"]).inc();
                    if self.framed.send(ServerFrame::Push(frame)).await.is_err() {
                        break;
                    }
                }
                result = self.framed.next() => {
                    match result {
                        Some(Ok(frame)) => {
                            match self.process_frame(frame, &mut guard).await {
                                Ok(NextAction::Continue) => {}
                                Ok(NextAction::ExitLoop) => break,
                                Err(e) => {
                                    let error_frame = ServerFrame::Error(ErrorFrame::from(&e));
                                    if self.framed.send(error_frame).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("subscribe connection {} frame error: {e}", self.addr);
                            break;
                        }
                        None => {
                            debug!("subscribe connection {} closed by peer", self.addr);
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn process_frame(
        &mut self,
        frame: PullFrame,
        guard: &mut ConnectionGuard,
    ) -> Result<NextAction, LivecfgError> {
        if self.state.config.open_client_auth_token && !self.session.authenticated {
            self.authenticate(&frame).await?;
            self.session.authenticated = true;
        }

        metrics::PULLS_TOTAL.inc();
        let decision = self
            .state
            .push_engine
            .handle_pull(
                self.session.session_id.clone(),
                &frame.config_name,
                &frame.env,
                &frame.hash_code,
                frame.context,
                &self.addr.ip().to_string(),
                &self.addr.ip().to_string(),
            )
            .await?;

        if self.session.session_id.as_deref() != Some(decision.session_id.as_str()) {
            self.session.session_id = Some(decision.session_id.clone());
            guard.set_session_id(decision.session_id.clone());
            self.state
                .register_session_channel(decision.session_id.clone(), self.push_tx.clone());
            metrics::CONNECTED_SESSIONS.inc();
        }

        let label = match decision.response_mode {
            ResponseMode::Notify => "notify",
            ResponseMode::Reply => "reply",
        };
        if decision.changed {
            metrics::PUSHES_TOTAL.with_label_values(&[label]).inc();
        } else {
            metrics::NOCHANGE_TOTAL.inc();
        }

        let push_frame = PushFrame::from(&decision);
        self.framed
            .send(ServerFrame::Push(push_frame))
            .await
            .map_err(|_| LivecfgError::Connect("client disconnected mid-reply".to_string()))?;
        Ok(NextAction::Continue)
    }

    /// Validates the pull frame's `context.authorization_token` against the
    /// `AuthManager` when `OPEN_CLIENT_AUTH_TOKEN` is enabled. The original
    /// reads this token from a request header on the `/connect` handshake;
    /// since this crate's subscribe channel is a raw duplex byte stream with
    /// no header mechanism, the token travels in the pull frame's `context`
    /// object instead (see DESIGN.md).
    async fn authenticate(&self, frame: &PullFrame) -> Result<(), LivecfgError> {
        let token = frame
            .context
            .get("authorization_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LivecfgError::Connect("authorization token lost".to_string()))?;
        match self.state.auth.find_by_token(token).await? {
            Some(_user) => Ok(()),
            None => Err(LivecfgError::Connect(
                "authorization token not exist".to_string(),
            )),
        }
    }
}
