// src/core/bus.rs

//! The cross-process change-notification bus. Messages are self-describing
//! frames of shape `{func, args, kwargs}` where `func` names one of a small
//! set of recognised callbacks.
//!
//! Only the wire boundary (a backend's `publish`/`subscribe`) ever touches
//! the raw `{func, args, kwargs}` JSON envelope; everywhere else in the
//! process, events are the typed `BusEvent` below — no code outside this
//! module matches on a stringly-typed function name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::LivecfgError;

/// A summary of one connection session, mirrored to peer processes so
/// fleet-wide dashboards can enumerate subscribers without a direct
/// connection. Carries only what `GET /rtc/api/client` needs to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub config_name: String,
    pub env: String,
    pub hash_code: String,
    pub host_name: String,
    pub client_pid: Option<i64>,
    pub client_ip: String,
}

/// A typed notification bus event. The three variants are exactly the
/// recognised callback functions.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// `callback_config_changed(name)` — the document for `name` changed or
    /// was deleted.
    ConfigChanged { name: String },
    /// `callback_add_connection(session_id, summary)` — a new subscriber
    /// joined on another process.
    AddConnection {
        session_id: String,
        summary: ConnectionSummary,
    },
    /// `callback_remove_connection(session_id)` — that subscriber left.
    RemoveConnection { session_id: String },
}

/// The wire envelope: `{func, args, kwargs}`. `args` carries positional
/// values in the order `BusEvent` variants historically took them; `kwargs`
/// is unused by this implementation but kept on the wire for forward
/// compatibility with the shape the source emits.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    func: String,
    args: Vec<Value>,
    #[serde(default)]
    kwargs: serde_json::Map<String, Value>,
}

impl BusEvent {
    pub fn to_json(&self) -> Result<String, LivecfgError> {
        let envelope = match self {
            BusEvent::ConfigChanged { name } => Envelope {
                func: "callback_config_changed".to_string(),
                args: vec![Value::String(name.clone())],
                kwargs: Default::default(),
            },
            BusEvent::AddConnection {
                session_id,
                summary,
            } => Envelope {
                func: "callback_add_connection".to_string(),
                args: vec![
                    Value::String(session_id.clone()),
                    serde_json::to_value(summary)?,
                ],
                kwargs: Default::default(),
            },
            BusEvent::RemoveConnection { session_id } => Envelope {
                func: "callback_remove_connection".to_string(),
                args: vec![Value::String(session_id.clone())],
                kwargs: Default::default(),
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, LivecfgError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        let bad = || LivecfgError::Internal(format!("malformed bus frame: {raw}"));
        match envelope.func.as_str() {
            "callback_config_changed" => {
                let name = envelope
                    .args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(bad)?
                    .to_string();
                Ok(BusEvent::ConfigChanged { name })
            }
            "callback_add_connection" => {
                let session_id = envelope
                    .args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(bad)?
                    .to_string();
                let summary: ConnectionSummary =
                    serde_json::from_value(envelope.args.get(1).cloned().ok_or_else(bad)?)?;
                Ok(BusEvent::AddConnection {
                    session_id,
                    summary,
                })
            }
            "callback_remove_connection" => {
                let session_id = envelope
                    .args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(bad)?
                    .to_string();
                Ok(BusEvent::RemoveConnection { session_id })
            }
            other => Err(LivecfgError::Internal(format!(
                "unrecognised bus function: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_changed_round_trips() {
        let event = BusEvent::ConfigChanged {
            name: "myapp".into(),
        };
        let raw = event.to_json().unwrap();
        assert_eq!(BusEvent::from_json(&raw).unwrap(), event);
    }

    #[test]
    fn add_connection_round_trips() {
        let event = BusEvent::AddConnection {
            session_id: "abc123".into(),
            summary: ConnectionSummary {
                config_name: "myapp".into(),
                env: "prod".into(),
                hash_code: "deadbeefcafebabe".into(),
                host_name: "host-1".into(),
                client_pid: Some(42),
                client_ip: "10.0.0.1".into(),
            },
        };
        let raw = event.to_json().unwrap();
        assert_eq!(BusEvent::from_json(&raw).unwrap(), event);
    }

    #[test]
    fn unrecognised_function_errors() {
        let raw = r#"{"func":"callback_unknown","args":[],"kwargs":{}}"#;
        assert!(BusEvent::from_json(raw).is_err());
    }
}
