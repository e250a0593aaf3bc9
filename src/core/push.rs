// src/core/push.rs

//! The Push Engine: on a pull frame, resolve and compare hashes; on a
//! `callback_config_changed` event, re-resolve for direct and one-level
//! transitive dependents and push to any session whose last-known hash is
//! stale.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use serde::{Deserialize, Serialize};

use crate::core::errors::LivecfgError;
use crate::core::registry::Registry;
use crate::core::resolver::resolve;
use crate::core::storage::StorageBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// The client is passive; the server writes without expecting an
    /// immediate reply.
    Notify,
    /// The client should acknowledge by sending its next pull, letting the
    /// server detect staleness.
    Reply,
}

/// What the Push Engine decided to tell one session, independent of how the
/// wire protocol encodes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PushDecision {
    pub session_id: String,
    pub config_name: String,
    pub env: String,
    pub hash_code: String,
    pub changed: bool,
    pub data: IndexMap<String, Value>,
    pub response_mode: ResponseMode,
}

/// Per-project `tokio::sync::Mutex`, obtained from a `DashMap`, serializing
/// the hash-compare-then-send sequence for a given project without taking a
/// registry-wide lock.
pub struct PushEngine {
    backend: Arc<dyn StorageBackend>,
    registry: Arc<Registry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PushEngine {
    pub fn new(backend: Arc<dyn StorageBackend>, registry: Arc<Registry>) -> Self {
        Self {
            backend,
            registry,
            locks: DashMap::new(),
        }
    }

    fn project_lock(&self, config_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(config_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Entry point 1: a pull frame arrived. Attaches the session to the
    /// Registry (assigning a fresh id on first pull), resolves, and decides
    /// `changed`/`nochange` in notify mode.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_pull(
        &self,
        session_id: Option<String>,
        config_name: &str,
        env: &str,
        client_hash: &str,
        client_context: Value,
        host_name: &str,
        client_ip: &str,
    ) -> Result<PushDecision, LivecfgError> {
        self.backend.read(config_name, true).await?;
        let lock = self.project_lock(config_name);
        let _guard = lock.lock().await;

        let resolved = resolve(self.backend.as_ref(), config_name, env, &client_context).await?;
        let (session_id, event) = self.registry.attach(
            session_id,
            config_name,
            env,
            &resolved.hash_code,
            client_context,
            host_name,
            client_ip,
        )?;
        if let Err(e) = self.backend.publish(event.to_bus_event()).await {
            warn!("push engine: failed to publish registry event: {e}");
        }

        let changed = resolved.hash_code != client_hash;
        Ok(PushDecision {
            session_id,
            config_name: config_name.to_string(),
            env: env.to_string(),
            hash_code: resolved.hash_code,
            changed,
            data: if changed {
                resolved.data
            } else {
                IndexMap::new()
            },
            response_mode: ResponseMode::Notify,
        })
    }

    /// Entry point 2: `name`'s document changed. Re-resolves for `name`
    /// itself and every project listing `name` directly in `parent` (one
    /// level only — deeper cascades are reached through their own direct
    /// dependents on subsequent changes). Returns one `Reply`-mode decision
    /// per session whose recorded hash no longer matches; sessions whose
    /// hash already matches are skipped without a frame.
    pub async fn handle_config_changed(
        &self,
        name: &str,
    ) -> Result<Vec<PushDecision>, LivecfgError> {
        let mut targets = vec![name.to_string()];
        for listing in self.backend.iter().await? {
            if listing.config_name != name && listing.document.parent.iter().any(|p| p == name) {
                targets.push(listing.config_name);
            }
        }

        let mut decisions = Vec::new();
        for target in targets {
            let lock = self.project_lock(&target);
            let _guard = lock.lock().await;

            for session_id in self.registry.list(&target) {
                let Some(record) = self.registry.last_pull(&session_id) else {
                    continue;
                };
                let resolved = match resolve(
                    self.backend.as_ref(),
                    &target,
                    &record.env,
                    &record.client_context,
                )
                .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("push engine: re-resolution of {target} failed: {e}");
                        continue;
                    }
                };
                if resolved.hash_code == record.hash_code {
                    continue;
                }

                if let Some(event) =
                    self.registry
                        .touch(&session_id, &resolved.hash_code, "", "")
                {
                    if let Err(e) = self.backend.publish(event.to_bus_event()).await {
                        warn!("push engine: failed to publish touch event: {e}");
                    }
                }

                info!("pushing changed config for {target} to session {session_id}");
                decisions.push(PushDecision {
                    session_id,
                    config_name: target.clone(),
                    env: record.env.clone(),
                    hash_code: resolved.hash_code,
                    changed: true,
                    data: resolved.data,
                    response_mode: ResponseMode::Reply,
                });
            }
        }
        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Entry, ProjectDocument};
    use crate::core::storage::FileBackend;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(key: &str, value: Value) -> Entry {
        Entry {
            key: key.to_string(),
            desc: String::new(),
            value,
        }
    }

    #[tokio::test]
    async fn pull_with_stale_hash_reports_changed() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());
        let mut doc = ProjectDocument::empty();
        doc.default.insert("a".to_string(), entry("a", json!(1)));
        backend.write("app", doc, false).await.unwrap();

        let registry = Arc::new(Registry::new(10));
        let engine = PushEngine::new(backend, registry);

        let decision = engine
            .handle_pull(
                None,
                "app",
                "default",
                "",
                Value::Null,
                "host-1",
                "10.0.0.1",
            )
            .await
            .unwrap();
        assert!(decision.changed);
        assert_eq!(decision.data.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn pull_with_matching_hash_reports_no_change() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());
        backend
            .write("app", ProjectDocument::empty(), false)
            .await
            .unwrap();

        let registry = Arc::new(Registry::new(10));
        let engine = PushEngine::new(backend, registry);

        let first = engine
            .handle_pull(
                None,
                "app",
                "default",
                "",
                Value::Null,
                "host-1",
                "10.0.0.1",
            )
            .await
            .unwrap();
        let second = engine
            .handle_pull(
                Some(first.session_id.clone()),
                "app",
                "default",
                &first.hash_code,
                Value::Null,
                "host-1",
                "10.0.0.1",
            )
            .await
            .unwrap();
        assert!(!second.changed);
        assert!(second.data.is_empty());
    }

    #[tokio::test]
    async fn config_changed_pushes_only_to_stale_dependents() {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::new(dir.path()).unwrap());
        backend
            .write("base", ProjectDocument::empty(), false)
            .await
            .unwrap();
        backend
            .write(
                "child",
                ProjectDocument::with_parent("base".to_string()),
                false,
            )
            .await
            .unwrap();

        let registry = Arc::new(Registry::new(10));
        let engine = PushEngine::new(backend.clone(), registry);

        engine
            .handle_pull(
                None,
                "child",
                "default",
                "",
                Value::Null,
                "host-1",
                "10.0.0.1",
            )
            .await
            .unwrap();

        let mut base = ProjectDocument::empty();
        base.default
            .insert("k".to_string(), entry("k", json!("v2")));
        backend.write("base", base, false).await.unwrap();

        let decisions = engine.handle_config_changed("base").await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].config_name, "child");
        assert_eq!(decisions[0].response_mode, ResponseMode::Reply);
    }
}
