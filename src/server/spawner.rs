// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use anyhow::Result;
use tracing::info;

use super::context::ServerContext;
use super::http_server;
use crate::core::state::run_bus_listener;

/// Spawns all background tasks into the provided JoinSet.
pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Bus Listener ---
    // Forwards remote `ConfigChanged`/connection events into the local
    // Push Engine and the mirrored Registry table.
    let bus_state = server_state.clone();
    let bus_rx = server_state.subscribe_bus();
    background_tasks.spawn(async move {
        run_bus_listener(bus_state, bus_rx).await;
        Ok(())
    });

    // --- Admin HTTP Surface ---
    if server_state.config.http.enabled {
        let http_state = server_state.clone();
        let shutdown_rx_http = shutdown_tx.subscribe();
        background_tasks.spawn(async move { http_server::run(http_state, shutdown_rx_http).await });
    } else {
        info!("admin HTTP surface is disabled in the configuration.");
    }

    info!("all background tasks have been spawned.");
    Ok(())
}
