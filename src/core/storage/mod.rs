// src/core/storage/mod.rs

//! The storage backend abstraction: a uniform read/write/delete/iterate/
//! publish/subscribe contract implemented by three concrete backends.

mod file_backend;
mod mongo_backend;
mod redis_backend;

pub use file_backend::FileBackend;
pub use mongo_backend::MongoBackend;
pub use redis_backend::RedisBackend;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::bus::BusEvent;
use crate::core::errors::LivecfgError;
use crate::core::model::ProjectDocument;

/// One project as yielded by `iter()`. Every backend yields the full
/// document; callers that only need the name discard it.
pub struct ProjectListing {
    pub config_name: String,
    pub document: ProjectDocument,
}

/// Object-safe storage backend trait, held as `Arc<dyn StorageBackend>` so the
/// server can pick a backend at startup from `Config::store_type` without
/// threading a generic parameter through every module.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the stored document, or `default` if absent. Fails with
    /// `ProjectNotFound` when `require_exists` is set and the document is
    /// absent.
    async fn read(
        &self,
        config_name: &str,
        require_exists: bool,
    ) -> Result<ProjectDocument, LivecfgError>;

    /// Persists `document`. When `merge` is true, deep-merges over the
    /// existing document (see `model::merge_documents`); otherwise replaces
    /// it outright. Publishes `ConfigChanged` on success.
    async fn write(
        &self,
        config_name: &str,
        document: ProjectDocument,
        merge: bool,
    ) -> Result<(), LivecfgError>;

    /// Deletes the document (a no-op if already absent). Publishes
    /// `ConfigChanged` on success.
    async fn delete(&self, config_name: &str) -> Result<(), LivecfgError>;

    /// Enumerates every stored project.
    async fn iter(&self) -> Result<Vec<ProjectListing>, LivecfgError>;

    /// Sends a change event on the bus out-of-band from a write (used by the
    /// Connection Registry to mirror session summaries).
    async fn publish(&self, event: BusEvent) -> Result<(), LivecfgError>;

    /// Registers a channel that receives every event arriving on the bus,
    /// including this process's own writes. Implementations run their
    /// subscriber loop on a dedicated task and forward parsed events through
    /// the returned receiver; the loop never executes consumer logic
    /// directly.
    fn subscribe(&self) -> mpsc::Receiver<BusEvent>;
}
