// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum LivecfgError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Project {config_name} config manager not exist.")]
    ProjectNotFound { config_name: String },

    #[error("Project {config_name} config manager existed.")]
    ProjectExists { config_name: String },

    #[error("Project {config_name} formatter error.")]
    ProjectNameError { config_name: String },

    #[error("Project {config_name} env [{env}] or value error.")]
    ProjectEnvError { config_name: String, env: String },

    /// Raised when resolution re-enters a project name already on the
    /// current call stack. Not present in the source, which resolves
    /// recursively without cycle detection (see DESIGN.md).
    #[error("Project {config_name} is part of a parent cycle involving {via}.")]
    ProjectCycle { config_name: String, via: String },

    #[error("Project {config_name} version changed error.")]
    ConfigVersion { config_name: String },

    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    GlobalApi(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LivecfgError {
    /// The HTTP/frame status class carried alongside a domain error, used by
    /// both the `{code, error_msg}` wire error frame and the admin surface's
    /// `{code, msg, data}` envelope.
    pub fn code(&self) -> i32 {
        match self {
            LivecfgError::ProjectNotFound { .. } => 404,
            LivecfgError::ProjectExists { .. } => 403,
            LivecfgError::ProjectNameError { .. } => 403,
            LivecfgError::ProjectEnvError { .. } => 404,
            LivecfgError::ProjectCycle { .. } => 404,
            LivecfgError::ConfigVersion { .. } => 400,
            LivecfgError::Connect(_) => 400,
            LivecfgError::GlobalApi(_) => 1,
            LivecfgError::Io(_) | LivecfgError::Json(_) | LivecfgError::Backend(_) => 500,
            LivecfgError::Internal(_) => 500,
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for LivecfgError {
    fn clone(&self) -> Self {
        match self {
            LivecfgError::Io(e) => LivecfgError::Io(Arc::clone(e)),
            LivecfgError::Json(s) => LivecfgError::Json(s.clone()),
            LivecfgError::ProjectNotFound { config_name } => LivecfgError::ProjectNotFound {
                config_name: config_name.clone(),
            },
            LivecfgError::ProjectExists { config_name } => LivecfgError::ProjectExists {
                config_name: config_name.clone(),
            },
            LivecfgError::ProjectNameError { config_name } => LivecfgError::ProjectNameError {
                config_name: config_name.clone(),
            },
            LivecfgError::ProjectEnvError { config_name, env } => LivecfgError::ProjectEnvError {
                config_name: config_name.clone(),
                env: env.clone(),
            },
            LivecfgError::ProjectCycle { config_name, via } => LivecfgError::ProjectCycle {
                config_name: config_name.clone(),
                via: via.clone(),
            },
            LivecfgError::ConfigVersion { config_name } => LivecfgError::ConfigVersion {
                config_name: config_name.clone(),
            },
            LivecfgError::Connect(s) => LivecfgError::Connect(s.clone()),
            LivecfgError::GlobalApi(s) => LivecfgError::GlobalApi(s.clone()),
            LivecfgError::Backend(s) => LivecfgError::Backend(s.clone()),
            LivecfgError::Internal(s) => LivecfgError::Internal(s.clone()),
        }
    }
}

impl PartialEq for LivecfgError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LivecfgError::Io(a), LivecfgError::Io(b)) => a.to_string() == b.to_string(),
            (LivecfgError::Json(a), LivecfgError::Json(b)) => a == b,
            (
                LivecfgError::ProjectNotFound { config_name: a },
                LivecfgError::ProjectNotFound { config_name: b },
            ) => a == b,
            (
                LivecfgError::ProjectExists { config_name: a },
                LivecfgError::ProjectExists { config_name: b },
            ) => a == b,
            (
                LivecfgError::ProjectEnvError {
                    config_name: a,
                    env: ea,
                },
                LivecfgError::ProjectEnvError {
                    config_name: b,
                    env: eb,
                },
            ) => a == b && ea == eb,
            (LivecfgError::Connect(a), LivecfgError::Connect(b)) => a == b,
            (LivecfgError::GlobalApi(a), LivecfgError::GlobalApi(b)) => a == b,
            (LivecfgError::Backend(a), LivecfgError::Backend(b)) => a == b,
            (LivecfgError::Internal(a), LivecfgError::Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for LivecfgError {
    fn from(e: std::io::Error) -> Self {
        LivecfgError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for LivecfgError {
    fn from(e: serde_json::Error) -> Self {
        LivecfgError::Json(e.to_string())
    }
}

impl From<redis::RedisError> for LivecfgError {
    fn from(e: redis::RedisError) -> Self {
        LivecfgError::Backend(format!("redis: {e}"))
    }
}

impl From<mongodb::error::Error> for LivecfgError {
    fn from(e: mongodb::error::Error) -> Self {
        LivecfgError::Backend(format!("mongodb: {e}"))
    }
}

impl From<bson::ser::Error> for LivecfgError {
    fn from(e: bson::ser::Error) -> Self {
        LivecfgError::Backend(format!("bson encode: {e}"))
    }
}

impl From<bson::de::Error> for LivecfgError {
    fn from(e: bson::de::Error) -> Self {
        LivecfgError::Backend(format!("bson decode: {e}"))
    }
}
