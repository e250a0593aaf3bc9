// src/server/mod.rs

use anyhow::Result;

use crate::config::Config;

mod connection_loop;
mod context;
mod http_server;
mod initialization;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize server state and the subscribe-channel listener.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks (Bus listener, admin HTTP surface).
    spawner::spawn_all(&mut server_context).await?;

    // 3. Start the main connection acceptance loop. Runs until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
