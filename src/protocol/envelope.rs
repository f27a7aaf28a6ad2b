//! Structured dialect wire envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action label of a structured command
pub const ACTION_COMMAND: &str = "command";

/// Action label of a registration acknowledgement
pub const ACTION_REGISTER_ACK: &str = "register_ack";

/// Tagged JSON envelope exchanged on structured topics
///
/// Every field is optional on decode; which ones are required depends on the
/// topic and is checked when the envelope is turned into an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Unix seconds
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl Envelope {
    /// Command envelope published to `device/command/{device_id}`
    #[must_use]
    pub fn command(device_id: &str, command: &str) -> Self {
        Self {
            action: ACTION_COMMAND.to_string(),
            command: Some(command.to_string()),
            timestamp: chrono::Utc::now().timestamp(),
            data: None,
            device_id: Some(device_id.to_string()),
        }
    }

    /// Acknowledgement published after a successful registration
    #[must_use]
    pub fn register_ack(device_id: &str) -> Self {
        let mut data = Map::new();
        data.insert("status".to_string(), Value::from("success"));
        data.insert(
            "message".to_string(),
            Value::from("Device registered successfully"),
        );

        Self {
            action: ACTION_REGISTER_ACK.to_string(),
            command: None,
            timestamp: chrono::Utc::now().timestamp(),
            data: Some(data),
            device_id: Some(device_id.to_string()),
        }
    }

    /// Device id carried at the top level, ignoring empty strings
    #[must_use]
    pub fn top_level_device_id(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|id| !id.is_empty())
    }

    /// `data.<key>` when it is a non-empty string
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Device id from the envelope, falling back to `data.device_id`
    #[must_use]
    pub fn resolve_device_id(&self) -> Option<&str> {
        self.top_level_device_id()
            .or_else(|| self.data_str("device_id"))
    }

    /// Encode for publishing
    ///
    /// # Errors
    ///
    /// Returns error if the envelope cannot be serialized
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
