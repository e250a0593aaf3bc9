// src/server/initialization.rs

//! Handles the complete server initialization process: constructing the
//! storage backend and its supporting managers, then binding the subscribe
//! channel's listener.

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = ServerState::initialize(config).await?;
    info!(
        "server state initialized (store_type = {:?})",
        state.config.store_type
    );

    let listener = TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    info!(
        "livecfg subscribe channel listening on {}:{}",
        state.config.host, state.config.port
    );

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "livecfg starting with store_type = {:?}, max_connection = {}",
        config.store_type, config.max_connection
    );
    if config.open_client_auth_token {
        info!("subscribe-time token authentication is enabled");
    }
}
