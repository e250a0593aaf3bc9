// src/core/storage/file_backend.rs

//! Local JSON file tree backend. One JSON file per project in a configured
//! directory. Mutations publish locally only — no cross-process fan-out —
//! so this backend is only correct in single-process deployments.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::core::bus::BusEvent;
use crate::core::errors::LivecfgError;
use crate::core::model::{self, ProjectDocument};
use crate::core::storage::{ProjectListing, StorageBackend};

const EXTENSION: &str = "json";
/// Buffer depth for the in-process fan-out broadcast channel.
const NOTIFY_CAPACITY: usize = 1024;

pub struct FileBackend {
    directory: PathBuf,
    notifier: broadcast::Sender<BusEvent>,
}

impl FileBackend {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, LivecfgError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        let (notifier, _rx) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self {
            directory,
            notifier,
        })
    }

    fn path_for(&self, config_name: &str) -> PathBuf {
        self.directory.join(format!("{config_name}.{EXTENSION}"))
    }

    fn is_project_file(path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            return None;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(
        &self,
        config_name: &str,
        require_exists: bool,
    ) -> Result<ProjectDocument, LivecfgError> {
        let path = self.path_for(config_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("file backend: {} not found", path.display());
                if require_exists {
                    Err(LivecfgError::ProjectNotFound {
                        config_name: config_name.to_string(),
                    })
                } else {
                    Ok(ProjectDocument::empty())
                }
            }
            Err(e) => Err(e.into()),
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
        tokio::fs::write(self.path_for(config_name), raw).await?;
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn delete(&self, config_name: &str) -> Result<(), LivecfgError> {
        match tokio::fs::remove_file(self.path_for(config_name)).await {
            Ok(()) | Err(_) => {}
        }
        self.publish(BusEvent::ConfigChanged {
            name: config_name.to_string(),
        })
        .await
    }

    async fn iter(&self) -> Result<Vec<ProjectListing>, LivecfgError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(config_name) = Self::is_project_file(&entry.path()) else {
                continue;
            };
            let document = self.read(&config_name, false).await?;
            out.push(ProjectListing {
                config_name,
                document,
            });
        }
        Ok(out)
    }

    async fn publish(&self, event: BusEvent) -> Result<(), LivecfgError> {
        // Best-effort: no active subscribers is not an error.
        let _ = self.notifier.send(event);
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<BusEvent> {
        let mut rx = self.notifier.subscribe();
        let (tx, out_rx) = mpsc::channel(NOTIFY_CAPACITY);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("file backend subscriber lagged, skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        out_rx
    }
}
