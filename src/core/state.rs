// src/core/state.rs

//! Ties the Storage Backend, Connection Registry, Push Engine, Config
//! Manager and Auth Manager into the one shared handle threaded through
//! every connection handler and admin route.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, StoreType};
use crate::core::auth::{AuthManager, AuthStore, FileAuthStore, MongoAuthStore, RedisAuthStore};
use crate::core::bus::BusEvent;
use crate::core::errors::LivecfgError;
use crate::core::manager::ConfigManager;
use crate::core::protocol::PushFrame;
use crate::core::push::PushEngine;
use crate::core::registry::Registry;
use crate::core::storage::{FileBackend, MongoBackend, RedisBackend, StorageBackend};

pub struct ServerState {
    pub config: Config,
    pub backend: Arc<dyn StorageBackend>,
    pub registry: Arc<Registry>,
    pub push_engine: Arc<PushEngine>,
    pub manager: Arc<ConfigManager>,
    pub auth: Arc<AuthManager>,
    /// One outbound channel per locally-attached session, used by the Bus
    /// listener to deliver a `changed` frame straight onto a live connection
    /// without waiting for that session's next pull — a "reply"-mode push.
    /// A session with no entry here belongs to another process; its own
    /// Bus listener handles it there.
    session_channels: DashMap<String, mpsc::Sender<PushFrame>>,
}

impl ServerState {
    pub async fn initialize(config: Config) -> Result<Arc<Self>, LivecfgError> {
        let backend: Arc<dyn StorageBackend> = match config.store_type {
            StoreType::JsonFile => Arc::new(FileBackend::new(&config.config_store_directory)?),
            StoreType::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    LivecfgError::Backend("redis store requires REDIS_URL".to_string())
                })?;
                Arc::new(RedisBackend::new(url, config.notify_channel.clone()).await?)
            }
            StoreType::Mongodb => {
                let url = config.mongodb_url.as_deref().ok_or_else(|| {
                    LivecfgError::Backend("mongodb store requires MONGODB_URL".to_string())
                })?;
                Arc::new(MongoBackend::new(url).await?)
            }
        };

        let auth_store: Box<dyn AuthStore> = match config.store_type {
            StoreType::JsonFile => Box::new(FileAuthStore::new(&config.config_store_directory)),
            StoreType::Redis => {
                let url = config.redis_url.as_deref().expect("validated above");
                Box::new(RedisAuthStore::new(url).await?)
            }
            StoreType::Mongodb => {
                let url = config.mongodb_url.as_deref().expect("validated above");
                Box::new(MongoAuthStore::new(url).await?)
            }
        };
        let auth = Arc::new(AuthManager::new(auth_store));
        auth.init_admin().await?;

        let registry = Arc::new(Registry::new(config.max_connection));
        let push_engine = Arc::new(PushEngine::new(backend.clone(), registry.clone()));
        let manager = Arc::new(ConfigManager::new(backend.clone()));

        Ok(Arc::new(Self {
            config,
            backend,
            registry,
            push_engine,
            manager,
            auth,
            session_channels: DashMap::new(),
        }))
    }

    /// Registers a fresh subscriber on the backend's change bus.
    pub fn subscribe_bus(&self) -> mpsc::Receiver<BusEvent> {
        self.backend.subscribe()
    }

    /// Registers the live connection for `session_id`, so proactive pushes
    /// (entry point 2) can reach it directly.
    pub fn register_session_channel(&self, session_id: String, sender: mpsc::Sender<PushFrame>) {
        self.session_channels.insert(session_id, sender);
    }

    pub fn unregister_session_channel(&self, session_id: &str) {
        self.session_channels.remove(session_id);
    }
}

/// Drains `rx` for the lifetime of the process, routing each Bus event to
/// the Push Engine (config changes, fanned out to locally-attached sessions)
/// or the Connection Registry (mirroring a peer process's session summary).
/// Events are received on a dedicated task and never executed directly on
/// the subscriber thread.
pub async fn run_bus_listener(state: Arc<ServerState>, mut rx: mpsc::Receiver<BusEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            BusEvent::ConfigChanged { name } => {
                let decisions = match state.push_engine.handle_config_changed(&name).await {
                    Ok(decisions) => decisions,
                    Err(e) => {
                        warn!("bus listener: failed to propagate change for {name}: {e}");
                        continue;
                    }
                };
                for decision in decisions {
                    crate::core::metrics::PUSHES_TOTAL
                        .with_label_values(&["reply"])
                        .inc();
                    let Some(sender) = state.session_channels.get(&decision.session_id) else {
                        continue;
                    };
                    let frame = PushFrame::from(&decision);
                    if sender.send(frame).await.is_err() {
                        info!(
                            "bus listener: session {} no longer accepting pushes",
                            decision.session_id
                        );
                    }
                }
            }
            other => state.registry.mirror(&other),
        }
    }
}
