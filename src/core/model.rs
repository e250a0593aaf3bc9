// src/core/model.rs

//! The project document data model: environment overlays, inheritance,
//! variable definitions and audit history. A project document is a plain
//! nested map: one `IndexMap` of entries per environment.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::core::errors::LivecfgError;

/// `config_name` must match this pattern; names outside it are rejected.
/// The source uses `^[一-龥_a-zA-Z0-9_]+$` (CJK ideographs plus the
/// usual identifier alphabet); `\p{Han}` is the Unicode-property equivalent.
static CONFIG_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{Han}_A-Za-z0-9]+$").unwrap());

pub fn validate_config_name(name: &str) -> Result<(), LivecfgError> {
    if CONFIG_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(LivecfgError::ProjectNameError {
            config_name: name.to_string(),
        })
    }
}

/// One entry within `default` or a named environment. The outer map key and
/// `key` are kept equal by convention (the redundancy enables
/// order-independent iteration over the map's values alone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    #[serde(default)]
    pub desc: String,
    pub value: Value,
}

/// `{before, after, operator, lut}` — one audit record for one key change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub before: Option<Entry>,
    pub after: Entry,
    pub operator: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub lut: String,
}

pub type EnvMap = IndexMap<String, Entry>;
pub type HistoryMap = IndexMap<String, IndexMap<String, Vec<HistoryRecord>>>;

/// The persisted unit keyed by `config_name`. Top-level keys are the four
/// reserved namespaces plus any number of user-defined environment names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default)]
    pub default: EnvMap,
    #[serde(default)]
    pub environ: EnvMap,
    #[serde(default)]
    pub history: HistoryMap,
    #[serde(default)]
    pub parent: Vec<String>,
    /// Every other top-level key: a user-defined environment.
    #[serde(flatten)]
    pub environments: IndexMap<String, EnvMap>,
}

impl ProjectDocument {
    /// The `ENV_DOMAIN` default shape: all four reserved keys present, empty.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: String) -> Self {
        Self {
            parent: vec![parent],
            ..Self::default()
        }
    }

    /// Looks up a named environment's entry map. `"default"` and `"environ"`
    /// resolve to their dedicated fields; anything else is a user environment.
    pub fn get_env(&self, env: &str) -> Option<&EnvMap> {
        match env {
            "default" => Some(&self.default),
            "environ" => Some(&self.environ),
            other => self.environments.get(other),
        }
    }

    pub fn get_env_mut(&mut self, env: &str) -> Option<&mut EnvMap> {
        match env {
            "default" => Some(&mut self.default),
            "environ" => Some(&mut self.environ),
            other => self.environments.get_mut(other),
        }
    }

    /// True if `env` is a recognised namespace on this document (including the
    /// always-present reserved ones).
    pub fn has_env(&self, env: &str) -> bool {
        matches!(env, "default" | "environ") || self.environments.contains_key(env)
    }

    /// Ensures a user environment map exists, creating it empty if absent.
    pub fn ensure_env(&mut self, env: &str) -> &mut EnvMap {
        match env {
            "default" => &mut self.default,
            "environ" => &mut self.environ,
            other => self.environments.entry(other.to_string()).or_default(),
        }
    }

    pub fn validate_env(&self, config_name: &str, env: &str) -> Result<(), LivecfgError> {
        if self.has_env(env) {
            Ok(())
        } else {
            Err(LivecfgError::ProjectEnvError {
                config_name: config_name.to_string(),
                env: env.to_string(),
            })
        }
    }
}

/// Deep-merges `incoming` over `base`: maps union with new winning per-key,
/// list items from `base` are prepended to `incoming`'s list (existing items
/// preserved, new list wins on conflicting indices).
pub fn merge_documents(base: &ProjectDocument, incoming: &mut ProjectDocument) {
    merge_env(&base.default, &mut incoming.default);
    merge_env(&base.environ, &mut incoming.environ);
    for (env, entries) in &base.environments {
        let target = incoming.environments.entry(env.clone()).or_default();
        merge_env(entries, target);
    }
    if incoming.parent.is_empty() {
        incoming.parent = base.parent.clone();
    } else {
        for p in base.parent.iter().rev() {
            if !incoming.parent.contains(p) {
                incoming.parent.insert(0, p.clone());
            }
        }
    }
    for (env, keys) in &base.history {
        let target_env = incoming.history.entry(env.clone()).or_default();
        for (key, records) in keys {
            target_env
                .entry(key.clone())
                .or_default()
                .splice(0..0, records.iter().cloned());
        }
    }
}

fn merge_env(base: &EnvMap, incoming: &mut EnvMap) {
    for (key, entry) in base {
        incoming.entry(key.clone()).or_insert_with(|| entry.clone());
    }
}
