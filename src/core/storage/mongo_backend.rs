// src/core/storage/mongo_backend.rs

//! Document store backend. Projects live in one collection; events in a
//! second collection keyed by a microsecond timestamp, polled by
//! subscribers with `tsp > last-seen`.

use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use crate::core::bus::BusEvent;
use crate::core::errors::LivecfgError;
use crate::core::model::{self, ProjectDocument};
use crate::core::storage::{ProjectListing, StorageBackend};

const CONFIG_COLLECTION: &str = "rt_config_data";
const PUBLISH_COLLECTION: &str = "rt_config_publish";
const MPSC_CAPACITY: usize = 1024;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize)]
struct ConfigModel {
    config_name: String,
    data: ProjectDocument,
    created: BsonDateTime,
    lut: BsonDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct PublishModel {
    tsp: i64,
    message: String,
    created: BsonDateTime,
}

pub struct MongoBackend {
    db: Database,
    /// Serializes publish so the microsecond `tsp` stays monotonic across
    /// concurrent writers within this process.
    last_tsp: Mutex<i64>,
    poll_interval: Duration,
}

impl MongoBackend {
    pub async fn new(url: &str) -> Result<Self, LivecfgError> {
        Self::with_poll_interval(url, DEFAULT_POLL_INTERVAL).await
    }

    pub async fn with_poll_interval(
        url: &str,
        poll_interval: Duration,
    ) -> Result<Self, LivecfgError> {
        let client = Client::with_uri_str(url).await?;
        let db = client.default_database().ok_or_else(|| {
            LivecfgError::Backend("mongodb URL must name a default database".to_string())
        })?;
        Ok(Self {
            db,
            last_tsp: Mutex::new(0),
            poll_interval,
        })
    }

    fn configs(&self) -> Collection<ConfigModel> {
        self.db.collection(CONFIG_COLLECTION)
    }

    fn events(&self) -> Collection<PublishModel> {
        self.db.collection(PUBLISH_COLLECTION)
    }
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn start_of_today_micros() -> i64 {
    Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
        .timestamp_micros()
}

#[async_trait]
impl StorageBackend for MongoBackend {
    async fn read(
        &self,
        config_name: &str,
        require_exists: bool,
    ) -> Result<ProjectDocument, LivecfgError> {
        let found = self
            .configs()
            .find_one(doc! { "config_name": config_name })
            .await?;
        match found {
            Some(model) => Ok(model.data),
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
        let now = BsonDateTime::now();
        let existing = self
            .configs()
            .find_one(doc! { "config_name": config_name })
            .await?;
        if existing.is_some() {
            self.configs()
                .update_one(
                    doc! { "config_name": config_name },
                    doc! { "$set": { "data": bson::to_bson(&document)?, "lut": now } },
                )
                .await?;
        } else {
            self.configs()
                .insert_one(ConfigModel {
                    config_name: config_name.to_string(),
                    data: document,
                    created: now,
                    lut: now,
                })
                .await?;
        }
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn delete(&self, config_name: &str) -> Result<(), LivecfgError> {
        self.configs()
            .delete_one(doc! { "config_name": config_name })
            .await?;
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn iter(&self) -> Result<Vec<ProjectListing>, LivecfgError> {
        let mut cursor = self.configs().find(doc! {}).await?;
        let mut out = Vec::new();
        while let Some(model) = cursor.try_next().await? {
            out.push(ProjectListing {
                config_name: model.config_name,
                document: model.data,
            });
        }
        Ok(out)
    }

    async fn publish(&self, event: BusEvent) -> Result<(), LivecfgError> {
        let mut last = self.last_tsp.lock().await;
        let mut tsp = now_micros();
        if tsp <= *last {
            tsp = *last + 1;
        }
        *last = tsp;
        self.events()
            .insert_one(PublishModel {
                tsp,
                message: event.to_json()?,
                created: BsonDateTime::now(),
            })
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<BusEvent> {
        let events = self.events();
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(MPSC_CAPACITY);
        tokio::spawn(async move {
            let mut last_seen = now_micros();
            let mut last_sweep_day = start_of_today_micros();
            loop {
                tokio::time::sleep(poll_interval).await;

                let today = start_of_today_micros();
                if today != last_sweep_day {
                    if let Err(e) = events
                        .delete_many(doc! { "tsp": { "$lt": today } })
                        .await
                    {
                        warn!("mongo backend: daily sweep failed: {e}");
                    }
                    last_sweep_day = today;
                }

                let filter = doc! { "tsp": { "$gt": last_seen } };
                let find_options = FindOptions::builder().sort(doc! { "tsp": 1 }).build();
                let mut cursor = match events.find(filter).with_options(find_options).await {
                    Ok(c) => c,
                    Err(e) => {
                        error!("mongo backend: poll query failed: {e}");
                        continue;
                    }
                };
                loop {
                    match cursor.try_next().await {
                        Ok(Some(model)) => {
                            last_seen = model.tsp;
                            match BusEvent::from_json(&model.message) {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("mongo backend: malformed bus frame ignored: {e}"),
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("mongo backend: cursor error: {e}");
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}
