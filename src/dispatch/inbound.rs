//! Inbound message classification
//!
//! Turns a raw `(topic, payload)` pair into a typed [`Inbound`] message. This
//! step is pure: it never touches the registry or the transport.

use std::collections::HashMap;

use serde_json::Value;

use crate::devices::StatusUpdate;
use crate::protocol::Envelope;
use crate::protocol::topics::{
    DEVICE_HEARTBEAT, DEVICE_OFFLINE, DEVICE_REGISTER, DEVICE_STATUS, LEGACY_RESTART_ACTION,
    LEGACY_STATUS_ACTION, RESPONSE_PREFIX,
};
use crate::{Error, Result};

/// Action label recorded for legacy status reports
pub const LEGACY_STATUS_LABEL: &str = "status_report";

/// A registration announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub device_id: String,
    pub client_id: String,
    pub attributes: HashMap<String, String>,
}

/// A classified inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain-text status on `{prefix}/{family}/status`
    LegacyStatus { family: String, status: String },
    /// Our own command topic `{prefix}/{family}/restart4g` echoed back
    LegacyCommandEcho { family: String },
    /// Structured registration
    Register(Registration),
    /// Structured status report, device id already resolved
    Status(StatusUpdate),
    /// Structured heartbeat
    Heartbeat { device_id: String },
    /// Structured offline notice
    Offline { device_id: String },
    /// Device reply to a prior command
    Response { device_id: String, action: String },
    /// Valid envelope on a topic nobody handles
    Unknown { topic: String },
}

impl Inbound {
    /// Short label for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LegacyStatus { .. } => "legacy_status",
            Self::LegacyCommandEcho { .. } => "legacy_command_echo",
            Self::Register(_) => "register",
            Self::Status(_) => "status",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Offline { .. } => "offline",
            Self::Response { .. } => "response",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Synthetic device id for a legacy family tag
#[must_use]
pub fn legacy_device_id(family: &str) -> String {
    format!("{family}-device")
}

/// Synthetic client id for a legacy family tag
#[must_use]
pub fn legacy_client_id(family: &str) -> String {
    format!("{family}-client")
}

/// Classify an inbound message
///
/// Legacy topics are matched first, then the payload is decoded as a
/// structured envelope and routed by topic.
///
/// # Errors
///
/// Returns `Decode` if a non-legacy payload is not a valid envelope and
/// `Validation` if a required field is missing
pub fn parse(topic: &str, payload: &[u8], legacy_prefix: &str) -> Result<Inbound> {
    if let Some(message) = parse_legacy(topic, payload, legacy_prefix)? {
        return Ok(message);
    }

    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| Error::Decode(e.to_string()))?;

    match topic {
        DEVICE_REGISTER => parse_register(&envelope).map(Inbound::Register),
        DEVICE_STATUS => parse_status(envelope).map(Inbound::Status),
        DEVICE_HEARTBEAT => require_device_id(&envelope, "heartbeat")
            .map(|device_id| Inbound::Heartbeat { device_id }),
        DEVICE_OFFLINE => require_device_id(&envelope, "offline")
            .map(|device_id| Inbound::Offline { device_id }),
        _ => {
            if let Some(rest) = topic
                .strip_prefix(RESPONSE_PREFIX)
                .and_then(|r| r.strip_prefix('/'))
            {
                let device_id = rest.split('/').next().unwrap_or_default();
                if device_id.is_empty() {
                    return Err(Error::Validation(format!(
                        "response topic without device id: {topic}"
                    )));
                }
                return Ok(Inbound::Response {
                    device_id: device_id.to_string(),
                    action: envelope.action,
                });
            }
            Ok(Inbound::Unknown {
                topic: topic.to_string(),
            })
        }
    }
}

/// Match `{prefix}/{family}/{restart4g|status}`
fn parse_legacy(topic: &str, payload: &[u8], legacy_prefix: &str) -> Result<Option<Inbound>> {
    let parts: Vec<&str> = topic.split('/').collect();
    let [prefix, family, action] = parts.as_slice() else {
        return Ok(None);
    };
    if *prefix != legacy_prefix
        || (*action != LEGACY_RESTART_ACTION && *action != LEGACY_STATUS_ACTION)
    {
        return Ok(None);
    }
    if family.is_empty() {
        return Err(Error::Validation(format!(
            "legacy topic without family tag: {topic}"
        )));
    }

    let message = if *action == LEGACY_STATUS_ACTION {
        Inbound::LegacyStatus {
            family: (*family).to_string(),
            status: String::from_utf8_lossy(payload).into_owned(),
        }
    } else {
        Inbound::LegacyCommandEcho {
            family: (*family).to_string(),
        }
    };
    Ok(Some(message))
}

fn parse_register(envelope: &Envelope) -> Result<Registration> {
    let data = envelope
        .data
        .as_ref()
        .ok_or_else(|| Error::Validation("register message without data".to_string()))?;

    let device_id = envelope
        .data_str("device_id")
        .ok_or_else(|| Error::Validation("register message without device_id".to_string()))?
        .to_string();
    let client_id = envelope
        .data_str("client_id")
        .map_or_else(|| device_id.clone(), ToString::to_string);

    // Only string values are kept; anything else in device_info is dropped
    let attributes = data
        .get("device_info")
        .and_then(Value::as_object)
        .map(|info| {
            info.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    Ok(Registration {
        device_id,
        client_id,
        attributes,
    })
}

fn parse_status(envelope: Envelope) -> Result<StatusUpdate> {
    let fallback_id = envelope.top_level_device_id().map(ToString::to_string);
    let data = envelope
        .data
        .ok_or_else(|| Error::Validation("status message without data".to_string()))?;

    let mut status: StatusUpdate = serde_json::from_value(Value::Object(data))
        .map_err(|e| Error::Decode(format!("invalid status data: {e}")))?;

    if status.device_id.is_empty() {
        status.device_id = fallback_id
            .ok_or_else(|| Error::Validation("status message without device_id".to_string()))?;
    }
    Ok(status)
}

fn require_device_id(envelope: &Envelope, kind: &str) -> Result<String> {
    envelope
        .resolve_device_id()
        .map(ToString::to_string)
        .ok_or_else(|| Error::Validation(format!("{kind} message without device_id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(topic: &str, payload: &str) -> Result<Inbound> {
        parse(topic, payload.as_bytes(), "device")
    }

    #[test]
    fn legacy_status_takes_plain_text() {
        let msg = parse_default("device/oppo/status", "connected").unwrap();
        assert_eq!(
            msg,
            Inbound::LegacyStatus {
                family: "oppo".to_string(),
                status: "connected".to_string(),
            }
        );
    }

    #[test]
    fn legacy_status_wins_over_json_payload() {
        let msg = parse_default("device/oppo/status", r#"{"action":"x"}"#).unwrap();
        assert_eq!(msg.kind(), "legacy_status");
    }

    #[test]
    fn legacy_restart_is_an_echo() {
        let msg = parse_default("device/xiaomi/restart4g", "reboot").unwrap();
        assert_eq!(
            msg,
            Inbound::LegacyCommandEcho {
                family: "xiaomi".to_string()
            }
        );
    }

    #[test]
    fn legacy_requires_family() {
        assert!(matches!(
            parse_default("device//status", "ok"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn legacy_prefix_is_configurable() {
        let msg = parse("phones/oppo/status", b"ok", "phones").unwrap();
        assert_eq!(msg.kind(), "legacy_status");

        // Under a different prefix the default one is just an unknown topic
        assert!(matches!(
            parse("device/oppo/status", b"ok", "phones"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn register_extracts_fields() {
        let msg = parse_default(
            "device/register",
            r#"{"action":"register","data":{"device_id":"d1","client_id":"c1","device_info":{"device_type":"oppo","sdk":33}}}"#,
        )
        .unwrap();

        let Inbound::Register(reg) = msg else {
            panic!("expected registration");
        };
        assert_eq!(reg.device_id, "d1");
        assert_eq!(reg.client_id, "c1");
        assert_eq!(reg.attributes.len(), 1);
        assert_eq!(reg.attributes["device_type"], "oppo");
    }

    #[test]
    fn register_client_id_defaults_to_device_id() {
        let msg = parse_default("device/register", r#"{"data":{"device_id":"d1"}}"#).unwrap();
        let Inbound::Register(reg) = msg else {
            panic!("expected registration");
        };
        assert_eq!(reg.client_id, "d1");
        assert!(reg.attributes.is_empty());
    }

    #[test]
    fn register_without_device_id_is_invalid() {
        for payload in [
            r#"{"action":"register"}"#,
            r#"{"action":"register","data":{"client_id":"c1"}}"#,
            r#"{"action":"register","data":{"device_id":7}}"#,
            r#"{"action":"register","data":{"device_id":""}}"#,
        ] {
            assert!(
                matches!(
                    parse_default("device/register", payload),
                    Err(Error::Validation(_))
                ),
                "accepted {payload}"
            );
        }
    }

    #[test]
    fn status_falls_back_to_envelope_id() {
        let msg = parse_default(
            "device/status",
            r#"{"action":"status","device_id":"d1","data":{"network_status":"wifi","last_action":"switch"}}"#,
        )
        .unwrap();

        let Inbound::Status(status) = msg else {
            panic!("expected status");
        };
        assert_eq!(status.device_id, "d1");
        assert_eq!(status.network_status, "wifi");
        assert_eq!(status.last_action.as_deref(), Some("switch"));
    }

    #[test]
    fn status_prefers_data_id() {
        let msg = parse_default(
            "device/status",
            r#"{"device_id":"outer","data":{"device_id":"inner","network_status":"4g"}}"#,
        )
        .unwrap();
        let Inbound::Status(status) = msg else {
            panic!("expected status");
        };
        assert_eq!(status.device_id, "inner");
    }

    #[test]
    fn status_with_wrong_field_types_is_a_decode_error() {
        assert!(matches!(
            parse_default("device/status", r#"{"data":{"device_id":"d1","network_status":5}}"#),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn status_without_any_id_is_invalid() {
        assert!(matches!(
            parse_default("device/status", r#"{"data":{"network_status":"4g"}}"#),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn heartbeat_and_offline_resolve_ids() {
        assert_eq!(
            parse_default("device/heartbeat", r#"{"device_id":"d1"}"#).unwrap(),
            Inbound::Heartbeat {
                device_id: "d1".to_string()
            }
        );
        assert_eq!(
            parse_default("device/offline", r#"{"data":{"device_id":"d2"}}"#).unwrap(),
            Inbound::Offline {
                device_id: "d2".to_string()
            }
        );
        assert!(matches!(
            parse_default("device/heartbeat", r#"{"action":"heartbeat"}"#),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn response_topic_carries_device_id() {
        assert_eq!(
            parse_default("device/response/d1", r#"{"action":"command_result"}"#).unwrap(),
            Inbound::Response {
                device_id: "d1".to_string(),
                action: "command_result".to_string(),
            }
        );
    }

    #[test]
    fn non_json_on_structured_topic_is_a_decode_error() {
        assert!(matches!(
            parse_default("device/heartbeat", "ping"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn unknown_topic_is_classified() {
        assert_eq!(
            parse_default("sensors/temp", r#"{"action":"reading"}"#).unwrap(),
            Inbound::Unknown {
                topic: "sensors/temp".to_string()
            }
        );
    }

    #[test]
    fn synthetic_ids_are_stable() {
        assert_eq!(legacy_device_id("oppo"), "oppo-device");
        assert_eq!(legacy_device_id("oppo"), legacy_device_id("oppo"));
        assert_eq!(legacy_client_id("oppo"), "oppo-client");
    }
}
