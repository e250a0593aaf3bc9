// src/core/storage/redis_backend.rs

//! Networked key-value store backend. Project documents are fields of a
//! single Redis hash; change events are delivered over a pub/sub channel.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::core::bus::BusEvent;
use crate::core::errors::LivecfgError;
use crate::core::model::{self, ProjectDocument};
use crate::core::storage::{ProjectListing, StorageBackend};

const HASH_KEY: &str = "rt_config_data";
const MPSC_CAPACITY: usize = 1024;

pub struct RedisBackend {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    notify_channel: String,
}

impl RedisBackend {
    pub async fn new(url: &str, notify_channel: impl Into<String>) -> Result<Self, LivecfgError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            client,
            manager,
            notify_channel: notify_channel.into(),
        })
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn read(
        &self,
        config_name: &str,
        require_exists: bool,
    ) -> Result<ProjectDocument, LivecfgError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.hget(HASH_KEY, config_name).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => {
                if require_exists {
                    Err(LivecfgError::ProjectNotFound {
                        config_name: config_name.to_string(),
                    })
                } else {
                    Ok(ProjectDocument::empty())
                }
            }
        }
    }

    async fn write(
        &self,
        config_name: &str,
        mut document: ProjectDocument,
        merge: bool,
    ) -> Result<(), LivecfgError> {
        if merge
            && let Ok(existing) = self.read(config_name, false).await
        {
            model::merge_documents(&existing, &mut document);
        }
        let raw = serde_json::to_string(&document)?;
        let mut conn = self.manager.clone();
        let _: () = conn.hset(HASH_KEY, config_name, raw).await?;
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn delete(&self, config_name: &str) -> Result<(), LivecfgError> {
        let mut conn = self.manager.clone();
        let _: () = conn.hdel(HASH_KEY, config_name).await?;
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn iter(&self) -> Result<Vec<ProjectListing>, LivecfgError> {
        let mut conn = self.manager.clone();
        let all: HashMap<String, String> = conn.hgetall(HASH_KEY).await?;
        let mut out = Vec::with_capacity(all.len());
        for (config_name, raw) in all {
            out.push(ProjectListing {
                config_name,
                document: serde_json::from_str(&raw)?,
            });
        }
        Ok(out)
    }

    async fn publish(&self, event: BusEvent) -> Result<(), LivecfgError> {
        let mut conn = self.manager.clone();
        let _: () = conn.publish(&self.notify_channel, event.to_json()?).await?;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<BusEvent> {
        let client = self.client.clone();
        let channel = self.notify_channel.clone();
        let (tx, rx) = mpsc::channel(MPSC_CAPACITY);
        // A dedicated connection feeds this task; it never runs consumer
        // logic directly, only forwards parsed events downstream.
        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    error!("redis backend: failed to open pubsub connection: {e}");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&channel).await {
                error!("redis backend: failed to subscribe to {channel}: {e}");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("redis backend: undecodable pubsub payload: {e}");
                        continue;
                    }
                };
                match BusEvent::from_json(&payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("redis backend: malformed bus frame ignored: {e}");
                        debug!("frame was: {payload}");
                    }
                }
            }
        });
        rx
    }
}
