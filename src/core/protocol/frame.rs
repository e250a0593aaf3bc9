// src/core/protocol/frame.rs

//! Wire frame shapes for the subscribe channel: a pull frame (client →
//! server), a push frame (server → client), and an error frame (server →
//! client).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::LivecfgError;
use crate::core::push::{PushDecision, ResponseMode};

fn default_env() -> String {
    "default".to_string()
}

/// Client → server. `context` carries the client's ping/retry intervals,
/// daemon flags and `environ` override bag verbatim; this crate only reads
/// `environ` and passes the rest through to resolution untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullFrame {
    pub message_type: String,
    pub config_name: String,
    #[serde(default)]
    pub hash_code: String,
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "nochange")]
    NoChange,
    #[serde(rename = "changed")]
    Changed,
}

/// Server → client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushFrame {
    pub message_type: MessageType,
    pub config_name: String,
    pub hash_code: String,
    pub data: IndexMap<String, Value>,
    pub env: String,
    pub response_mode: ResponseMode,
}

impl From<&PushDecision> for PushFrame {
    fn from(decision: &PushDecision) -> Self {
        Self {
            message_type: if decision.changed {
                MessageType::Changed
            } else {
                MessageType::NoChange
            },
            config_name: decision.config_name.clone(),
            hash_code: decision.hash_code.clone(),
            data: decision.data.clone(),
            env: decision.env.clone(),
            response_mode: decision.response_mode,
        }
    }
}

/// Server → client, on a domain or protocol failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub code: i32,
    pub error_msg: String,
}

impl From<&LivecfgError> for ErrorFrame {
    fn from(error: &LivecfgError) -> Self {
        Self {
            code: error.code(),
            error_msg: error.to_string(),
        }
    }
}

/// Anything the server may write on the subscribe channel.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Push(PushFrame),
    Error(ErrorFrame),
}

impl From<PushFrame> for ServerFrame {
    fn from(frame: PushFrame) -> Self {
        ServerFrame::Push(frame)
    }
}

impl From<ErrorFrame> for ServerFrame {
    fn from(frame: ErrorFrame) -> Self {
        ServerFrame::Error(frame)
    }
}
