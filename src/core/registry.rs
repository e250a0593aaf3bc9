// src/core/registry.rs

//! The Connection Registry: tracks open subscriber sessions, the project and
//! environment each watches, and their last-seen hash. Exposes exactly four
//! operations — `attach`, `detach`, `touch`, `list`.

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::core::bus::{BusEvent, ConnectionSummary};
use crate::core::errors::LivecfgError;

const DEFAULT_MAX_CONNECTION: usize = 1024;

/// The last pull frame recorded for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRecord {
    pub config_name: String,
    pub env: String,
    pub hash_code: String,
    pub client_context: Value,
}

/// Emitted by every mutating Registry operation; publishing this to the Bus
/// is the caller's responsibility so registry mutation never blocks on I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Attached {
        session_id: String,
        summary: ConnectionSummary,
    },
    Detached {
        session_id: String,
    },
    Touched {
        session_id: String,
        summary: ConnectionSummary,
    },
}

impl RegistryEvent {
    /// The Bus-facing projection of this event — `Touched` shares
    /// `AddConnection`'s wire shape since both just refresh a mirrored
    /// summary.
    pub fn to_bus_event(&self) -> BusEvent {
        match self {
            RegistryEvent::Attached {
                session_id,
                summary,
            }
            | RegistryEvent::Touched {
                session_id,
                summary,
            } => BusEvent::AddConnection {
                session_id: session_id.clone(),
                summary: summary.clone(),
            },
            RegistryEvent::Detached { session_id } => BusEvent::RemoveConnection {
                session_id: session_id.clone(),
            },
        }
    }
}

/// `pool`, `session_info`, and the mirrored `other_sessions` table, each a
/// `DashMap` so no operation needs a registry-wide lock.
pub struct Registry {
    pool: DashMap<String, Vec<String>>,
    session_info: DashMap<String, PullRecord>,
    other_sessions: DashMap<String, ConnectionSummary>,
    max_connection: usize,
}

impl Registry {
    pub fn new(max_connection: usize) -> Self {
        Self {
            pool: DashMap::new(),
            session_info: DashMap::new(),
            other_sessions: DashMap::new(),
            max_connection,
        }
    }

    fn total_sessions(&self) -> usize {
        self.session_info.len() + self.other_sessions.len()
    }

    /// Registers a pull from `session_id` (generating a fresh opaque id when
    /// `None`, per "fresh opaque session id on first pull"). Rejects with
    /// `Connect` when admission would exceed `max_connection`.
    pub fn attach(
        &self,
        session_id: Option<String>,
        config_name: &str,
        env: &str,
        hash_code: &str,
        client_context: Value,
        host_name: &str,
        client_ip: &str,
    ) -> Result<(String, RegistryEvent), LivecfgError> {
        let is_new = session_id.is_none()
            || !self
                .session_info
                .contains_key(session_id.as_deref().unwrap_or_default());
        if is_new && self.total_sessions() >= self.max_connection {
            return Err(LivecfgError::Connect(format!(
                "Number of connection is already the maximum {}.",
                self.max_connection
            )));
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let client_pid = client_context.get("pid").and_then(Value::as_i64);

        self.pool
            .entry(config_name.to_string())
            .or_default()
            .retain(|s| s != &session_id);
        self.pool
            .entry(config_name.to_string())
            .or_default()
            .push(session_id.clone());

        self.session_info.insert(
            session_id.clone(),
            PullRecord {
                config_name: config_name.to_string(),
                env: env.to_string(),
                hash_code: hash_code.to_string(),
                client_context,
            },
        );

        let summary = ConnectionSummary {
            config_name: config_name.to_string(),
            env: env.to_string(),
            hash_code: hash_code.to_string(),
            host_name: host_name.to_string(),
            client_pid,
            client_ip: client_ip.to_string(),
        };

        let event = if is_new {
            RegistryEvent::Attached {
                session_id: session_id.clone(),
                summary,
            }
        } else {
            RegistryEvent::Touched {
                session_id: session_id.clone(),
                summary,
            }
        };
        Ok((session_id, event))
    }

    /// Records a fresh resolution hash for an already-attached session
    /// without changing its project/env — used by the Push Engine after a
    /// successful re-resolution.
    pub fn touch(
        &self,
        session_id: &str,
        hash_code: &str,
        host_name: &str,
        client_ip: &str,
    ) -> Option<RegistryEvent> {
        let mut record = self.session_info.get_mut(session_id)?;
        record.hash_code = hash_code.to_string();
        let summary = ConnectionSummary {
            config_name: record.config_name.clone(),
            env: record.env.clone(),
            hash_code: hash_code.to_string(),
            host_name: host_name.to_string(),
            client_pid: record.client_context.get("pid").and_then(Value::as_i64),
            client_ip: client_ip.to_string(),
        };
        Some(RegistryEvent::Touched {
            session_id: session_id.to_string(),
            summary,
        })
    }

    /// Removes a session from both tables. A session present in neither
    /// table (already detached, or never attached) still yields a
    /// `Detached` event — detach is idempotent by design.
    pub fn detach(&self, session_id: &str) -> RegistryEvent {
        if let Some((_, record)) = self.session_info.remove(session_id) {
            if let Some(mut sessions) = self.pool.get_mut(&record.config_name) {
                sessions.retain(|s| s != session_id);
            }
        }
        RegistryEvent::Detached {
            session_id: session_id.to_string(),
        }
    }

    /// Local sessions currently watching `config_name`.
    pub fn list(&self, config_name: &str) -> Vec<String> {
        self.pool
            .get(config_name)
            .map(|sessions| sessions.clone())
            .unwrap_or_default()
    }

    pub fn last_pull(&self, session_id: &str) -> Option<PullRecord> {
        self.session_info.get(session_id).map(|r| r.clone())
    }

    /// Applies a bus event into the mirrored `other_sessions` table. Events
    /// originating from this process are harmless to re-apply here; callers
    /// are expected to skip self-originated events upstream where cheap to
    /// do so, but correctness does not depend on it.
    pub fn mirror(&self, event: &BusEvent) {
        match event {
            BusEvent::AddConnection {
                session_id,
                summary,
            } => {
                self.other_sessions
                    .insert(session_id.clone(), summary.clone());
            }
            BusEvent::RemoveConnection { session_id } => {
                self.other_sessions.remove(session_id);
            }
            BusEvent::ConfigChanged { .. } => {}
        }
    }

    pub fn mirrored_session_count(&self) -> usize {
        self.other_sessions.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONNECTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attach_assigns_fresh_session_id_on_first_pull() {
        let registry = Registry::new(10);
        let (session_id, event) = registry
            .attach(None, "app", "default", "", Value::Null, "host-1", "10.0.0.1")
            .unwrap();
        assert!(!session_id.is_empty());
        assert!(matches!(event, RegistryEvent::Attached { .. }));
        assert_eq!(registry.list("app"), vec![session_id]);
    }

    #[test]
    fn re_attach_with_same_id_is_touched_not_attached() {
        let registry = Registry::new(10);
        let (session_id, _) = registry
            .attach(None, "app", "default", "h1", Value::Null, "host-1", "10.0.0.1")
            .unwrap();
        let (_, event) = registry
            .attach(
                Some(session_id.clone()),
                "app",
                "default",
                "h2",
                Value::Null,
                "host-1",
                "10.0.0.1",
            )
            .unwrap();
        assert!(matches!(event, RegistryEvent::Touched { .. }));
        assert_eq!(registry.last_pull(&session_id).unwrap().hash_code, "h2");
    }

    #[test]
    fn admission_rejects_past_max_connection() {
        let registry = Registry::new(1);
        registry
            .attach(None, "app", "default", "", Value::Null, "host-1", "10.0.0.1")
            .unwrap();
        let err = registry
            .attach(None, "app", "default", "", Value::Null, "host-1", "10.0.0.2")
            .unwrap_err();
        match err {
            LivecfgError::Connect(message) => {
                assert_eq!(message, "Number of connection is already the maximum 1.");
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn detach_removes_from_pool_and_session_info() {
        let registry = Registry::new(10);
        let (session_id, _) = registry
            .attach(None, "app", "default", "", Value::Null, "host-1", "10.0.0.1")
            .unwrap();
        registry.detach(&session_id);
        assert!(registry.list("app").is_empty());
        assert!(registry.last_pull(&session_id).is_none());
    }

    #[test]
    fn mirror_tracks_remote_sessions_toward_admission() {
        let registry = Registry::new(1);
        registry.mirror(&BusEvent::AddConnection {
            session_id: "remote-1".into(),
            summary: ConnectionSummary {
                config_name: "app".into(),
                env: "default".into(),
                hash_code: "abc".into(),
                host_name: "remote-host".into(),
                client_pid: None,
                client_ip: "10.0.0.9".into(),
            },
        });
        let err = registry
            .attach(None, "app", "default", "", json!({}), "host-1", "10.0.0.1")
            .unwrap_err();
        assert!(matches!(err, LivecfgError::Connect(_)));
    }
}
