//! Messages exchanged between the worker and the pages it controls

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors for control messages that cannot be understood
#[derive(Debug, Error)]
pub enum MessageError {
    /// The action name is not one the worker knows
    #[error("unknown control action: '{0}'. Valid actions: skipWaiting, clearCache")]
    UnknownAction(String),

    /// The message is JSON but not a control message
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Commands a page can send to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Activate the waiting version now
    SkipWaiting,
    /// Delete the current version's partitions
    ClearCache,
}

impl ControlMessage {
    /// Parses a message posted by a page
    ///
    /// Accepts the object form `{"action": "skipWaiting"}`, a JSON string
    /// `"skipWaiting"`, or the bare action name.
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::String(action)) => Self::from_action(&action),
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(_) => Self::from_action(raw.trim()),
        }
    }

    fn from_action(action: &str) -> Result<Self, MessageError> {
        match action {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "clearCache" => Ok(Self::ClearCache),
            other => Err(MessageError::UnknownAction(other.to_string())),
        }
    }
}

/// Notifications the worker sends to connected pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// A new version has been activated
    #[serde(rename = "SW_UPDATED")]
    Updated { version: String },
}

impl WorkerMessage {
    /// JSON form posted to pages
    pub fn to_json(&self) -> String {
        // Only string fields, so serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
