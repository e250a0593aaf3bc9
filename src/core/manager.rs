// src/core/manager.rs

//! `ConfigManager`: the admin-facing façade over the Storage Backend,
//! providing project lifecycle operations and per-entry writes with history
//! recording.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::core::errors::LivecfgError;
use crate::core::model::{self, validate_config_name, Entry, HistoryRecord, ProjectDocument};
use crate::core::storage::StorageBackend;

pub struct ConfigManager {
    backend: Arc<dyn StorageBackend>,
}

fn now_lut() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl ConfigManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Creates a new project. `copy_from` seeds the new document from an
    /// existing one (its `parent` list is replaced with `parent` if
    /// non-empty); otherwise the document starts empty with `parent` as
    /// given.
    pub async fn create_project(
        &self,
        config_name: &str,
        copy_from: Option<&str>,
        parent: Vec<String>,
    ) -> Result<(), LivecfgError> {
        validate_config_name(config_name)?;

        if self.project_exists(config_name).await? {
            return Err(LivecfgError::ProjectExists {
                config_name: config_name.to_string(),
            });
        }

        let mut document = match copy_from {
            Some(source) => self.backend.read(source, true).await?,
            None => ProjectDocument::empty(),
        };
        if !parent.is_empty() {
            document.parent = parent;
        }
        self.backend.write(config_name, document, false).await
    }

    /// Distinguishes "document truly absent" from "present but empty" by
    /// re-reading with `require_exists`, since `read(.., false)` never fails.
    async fn project_exists(&self, config_name: &str) -> Result<bool, LivecfgError> {
        match self.backend.read(config_name, true).await {
            Ok(_) => Ok(true),
            Err(LivecfgError::ProjectNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn remove_project(&self, config_name: &str) -> Result<(), LivecfgError> {
        self.backend.delete(config_name).await
    }

    pub async fn get_project(&self, config_name: &str) -> Result<ProjectDocument, LivecfgError> {
        self.backend.read(config_name, true).await
    }

    pub async fn list_projects(&self) -> Result<Vec<String>, LivecfgError> {
        Ok(self
            .backend
            .iter()
            .await?
            .into_iter()
            .map(|listing| listing.config_name)
            .collect())
    }

    /// Replaces or merges `document` over the existing project, per the
    /// `PUT /rtc/api/config` contract.
    pub async fn update_project(
        &self,
        config_name: &str,
        document: ProjectDocument,
        merge: bool,
    ) -> Result<(), LivecfgError> {
        self.backend.write(config_name, document, merge).await
    }

    /// Sets one entry within `env`, recording history only when the entry's
    /// content actually changes. When `reject_if_exists` is set (the admin
    /// `POST` contract), fails with `GlobalApi` if the key is already
    /// present.
    pub async fn set_entry(
        &self,
        config_name: &str,
        env: &str,
        key: &str,
        desc: String,
        value: Value,
        operator: Option<String>,
        reject_if_exists: bool,
    ) -> Result<(), LivecfgError> {
        let mut document = self.backend.read(config_name, true).await?;
        document.validate_env(config_name, env)?;

        let after = Entry {
            key: key.to_string(),
            desc,
            value,
        };

        let env_map = document.ensure_env(env);
        let before = env_map.get(key).cloned();
        if reject_if_exists && before.is_some() {
            return Err(LivecfgError::GlobalApi(format!(
                "entry {key} already exists in {config_name}[{env}]"
            )));
        }

        let changed = before.as_ref() != Some(&after);
        env_map.insert(key.to_string(), after.clone());

        if changed {
            document
                .history
                .entry(env.to_string())
                .or_default()
                .entry(key.to_string())
                .or_default()
                .push(HistoryRecord {
                    before,
                    after,
                    operator,
                    lut: now_lut(),
                });
        }

        self.backend.write(config_name, document, false).await
    }

    /// Removes one entry within `env`. A no-op (no history recorded) if the
    /// key was already absent.
    pub async fn remove_entry(
        &self,
        config_name: &str,
        env: &str,
        key: &str,
        operator: Option<String>,
    ) -> Result<(), LivecfgError> {
        let mut document = self.backend.read(config_name, true).await?;
        document.validate_env(config_name, env)?;

        let env_map = document.ensure_env(env);
        let Some(before) = env_map.shift_remove(key) else {
            return Ok(());
        };

        document
            .history
            .entry(env.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(HistoryRecord {
                before: Some(before),
                after: Entry {
                    key: key.to_string(),
                    desc: String::new(),
                    value: Value::Null,
                },
                operator,
                lut: now_lut(),
            });

        self.backend.write(config_name, document, false).await
    }

    /// Projects directly naming `config_name` in their `parent` list — the
    /// one-level transitive-dependent scan the Push Engine drives on change.
    pub async fn iter_dependency_config(
        &self,
        config_name: &str,
    ) -> Result<Vec<String>, LivecfgError> {
        Ok(self
            .backend
            .iter()
            .await?
            .into_iter()
            .filter(|listing| listing.document.parent.iter().any(|p| p == config_name))
            .map(|listing| listing.config_name)
            .collect())
    }

    /// Deep-merges `incoming` over the stored document and writes the result,
    /// exposed for callers that already hold a partially-built document (e.g.
    /// bulk import) rather than single-entry edits.
    pub async fn merge_project(
        &self,
        config_name: &str,
        mut incoming: ProjectDocument,
    ) -> Result<(), LivecfgError> {
        let existing = self.backend.read(config_name, false).await?;
        model::merge_documents(&existing, &mut incoming);
        self.backend.write(config_name, incoming, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::FileBackend;
    use serde_json::json;
    use tempfile::tempdir;

    fn manager() -> (ConfigManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());
        (ConfigManager::new(backend), dir)
    }

    #[tokio::test]
    async fn create_then_create_again_fails_with_project_exists() {
        let (manager, _dir) = manager();
        manager.create_project("App", None, vec![]).await.unwrap();
        let err = manager
            .create_project("App", None, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, LivecfgError::ProjectExists { .. }));
    }

    #[tokio::test]
    async fn set_entry_records_history_only_on_change() {
        let (manager, _dir) = manager();
        manager.create_project("App", None, vec![]).await.unwrap();

        manager
            .set_entry(
                "App",
                "default",
                "a",
                "".to_string(),
                json!("1"),
                Some("alice".to_string()),
                false,
            )
            .await
            .unwrap();
        manager
            .set_entry(
                "App",
                "default",
                "a",
                "".to_string(),
                json!("1"),
                Some("alice".to_string()),
                false,
            )
            .await
            .unwrap();
        manager
            .set_entry(
                "App",
                "default",
                "a",
                "".to_string(),
                json!("2"),
                Some("alice".to_string()),
                false,
            )
            .await
            .unwrap();

        let document = manager.get_project("App").await.unwrap();
        let records = &document.history["default"]["a"];
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].after.value, json!("2"));
    }

    #[tokio::test]
    async fn set_entry_rejects_existing_key_when_requested() {
        let (manager, _dir) = manager();
        manager.create_project("App", None, vec![]).await.unwrap();
        manager
            .set_entry("App", "default", "a", "".into(), json!(1), None, false)
            .await
            .unwrap();
        let err = manager
            .set_entry("App", "default", "a", "".into(), json!(2), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, LivecfgError::GlobalApi(_)));
    }

    #[tokio::test]
    async fn iter_dependency_config_finds_direct_children() {
        let (manager, _dir) = manager();
        manager.create_project("Base", None, vec![]).await.unwrap();
        manager
            .create_project("Child", None, vec!["Base".to_string()])
            .await
            .unwrap();
        manager
            .create_project("Other", None, vec![])
            .await
            .unwrap();

        let deps = manager.iter_dependency_config("Base").await.unwrap();
        assert_eq!(deps, vec!["Child".to_string()]);
    }
}
