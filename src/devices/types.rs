//! Device registry types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute key holding the device family tag
pub const ATTR_DEVICE_TYPE: &str = "device_type";

/// A known device and its presence state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "device_id")]
    pub id: String,
    pub client_id: String,
    pub last_seen: DateTime<Utc>,
    #[serde(rename = "is_online")]
    pub online: bool,
    pub network_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
    #[serde(
        rename = "device_info",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub attributes: HashMap<String, String>,
}

impl Device {
    /// Family tag from the `device_type` attribute
    #[must_use]
    pub fn family(&self) -> Option<&str> {
        self.attributes
            .get(ATTR_DEVICE_TYPE)
            .map(String::as_str)
            .filter(|f| !f.is_empty())
    }
}

/// A status report applied to a known device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub network_status: String,
    /// Unix seconds as reported by the device
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

/// Devices touched by one presence sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_offline: Vec<String>,
    pub reaped: Vec<String>,
}

impl SweepReport {
    /// Whether the sweep changed anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marked_offline.is_empty() && self.reaped.is_empty()
    }
}
