//! Topic names and topic builders for both dialects

use rumqttc::QoS;

/// Device registration announcements
pub const DEVICE_REGISTER: &str = "device/register";

/// Structured status reports
pub const DEVICE_STATUS: &str = "device/status";

/// Structured heartbeats
pub const DEVICE_HEARTBEAT: &str = "device/heartbeat";

/// Explicit offline notices
pub const DEVICE_OFFLINE: &str = "device/offline";

/// Prefix for structured command delivery (`device/command/{device_id}`)
pub const COMMAND_PREFIX: &str = "device/command";

/// Prefix for device replies and register acks (`device/response/{device_id}`)
pub const RESPONSE_PREFIX: &str = "device/response";

/// Legacy action segment for command delivery
pub const LEGACY_RESTART_ACTION: &str = "restart4g";

/// Legacy action segment for status reports
pub const LEGACY_STATUS_ACTION: &str = "status";

/// QoS used for every subscription and publish
pub const DEFAULT_QOS: QoS = QoS::AtLeastOnce;

/// Topic configuration for the legacy dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    /// First segment of legacy topics (`{legacy_prefix}/{family}/{action}`)
    pub legacy_prefix: String,

    /// Family tag used when a device has no `device_type` attribute
    pub default_family: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            legacy_prefix: "device".to_string(),
            default_family: "oppo".to_string(),
        }
    }
}

impl TopicConfig {
    /// Every topic filter the gateway subscribes to
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            DEVICE_REGISTER.to_string(),
            DEVICE_STATUS.to_string(),
            DEVICE_HEARTBEAT.to_string(),
            DEVICE_OFFLINE.to_string(),
            format!("{RESPONSE_PREFIX}/+"),
            format!("{}/+/{LEGACY_RESTART_ACTION}", self.legacy_prefix),
            format!("{}/+/{LEGACY_STATUS_ACTION}", self.legacy_prefix),
        ]
    }

    /// Legacy command topic for a family tag
    #[must_use]
    pub fn legacy_command_topic(&self, family: &str) -> String {
        format!("{}/{family}/{LEGACY_RESTART_ACTION}", self.legacy_prefix)
    }
}

/// Structured command topic for a device
#[must_use]
pub fn command_topic(device_id: &str) -> String {
    format!("{COMMAND_PREFIX}/{device_id}")
}

/// Response topic for a device
#[must_use]
pub fn response_topic(device_id: &str) -> String {
    format!("{RESPONSE_PREFIX}/{device_id}")
}
