// src/main.rs

//! The main entry point for the livecfg server application.

use std::env;
use std::process::ExitCode;

use anyhow::Result;
use livecfg::config::Config;
use livecfg::core::auth::{AuthManager, FileAuthStore};
use livecfg::core::auth::{MongoAuthStore, RedisAuthStore};
use livecfg::server;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("livecfg version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(2);
        }
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if args.len() > 1 && args[1] == "update_user" {
        if args.len() != 4 {
            eprintln!("Usage: livecfg update_user <username> <password>");
            std::process::exit(2);
        }
        return update_user(&config, &args[2], &args[3]).await;
    }

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(2);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(2);
        }
    }

    server::run(config).await
}

/// Implements the `update_user` subcommand: sets an admin credential against
/// the configured storage backend's auth store, then exits.
async fn update_user(config: &Config, username: &str, password: &str) -> Result<()> {
    use livecfg::config::StoreType;
    use livecfg::core::auth::AuthStore;

    let store: Box<dyn AuthStore> = match config.store_type {
        StoreType::JsonFile => Box::new(FileAuthStore::new(&config.config_store_directory)),
        StoreType::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("redis store requires REDIS_URL"))?;
            Box::new(RedisAuthStore::new(url).await?)
        }
        StoreType::Mongodb => {
            let url = config
                .mongodb_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("mongodb store requires MONGODB_URL"))?;
            Box::new(MongoAuthStore::new(url).await?)
        }
    };

    let manager = AuthManager::new(store);
    manager.update_user(username, password).await?;
    println!("Updated credentials for user '{username}'.");
    Ok(())
}
