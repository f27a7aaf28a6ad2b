//! Configuration management for the device gateway
//!
//! Each field is resolved as: CLI override > environment > TOML file > default.

pub mod file;

use std::time::Duration;

use file::GatewayConfigFile;

use crate::Result;
use crate::devices::PresencePolicy;
use crate::devices::presence::{DEFAULT_OFFLINE_AFTER, DEFAULT_REAP_AFTER, DEFAULT_SWEEP_INTERVAL};
use crate::protocol::TopicConfig;

/// Default broker host
pub const DEFAULT_BROKER: &str = "localhost";

/// Default broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 10;

/// Device gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker connection
    pub mqtt: MqttConfig,

    /// HTTP API server
    pub server: ServerConfig,

    /// Presence sweep interval and thresholds
    pub presence: PresencePolicy,

    /// Legacy topic layout
    pub topics: TopicConfig,
}

/// Broker connection configuration
#[derive(Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    /// MQTT client identifier, unique per process by default
    pub client_id: String,

    pub keep_alive: Duration,

    /// Upper bound on a single publish request
    pub publish_timeout: Duration,
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("broker", &self.broker)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("publish_timeout", &self.publish_timeout)
            .finish()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: DEFAULT_BROKER.to_string(),
            port: DEFAULT_MQTT_PORT,
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub broker: Option<String>,
    pub mqtt_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub http_port: Option<u16>,
}

/// `mqtt-server-` followed by eight hex digits of a fresh v4 uuid
#[must_use]
pub fn default_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("mqtt-server-{}", &id[..8])
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns `Config` if the presence thresholds are inconsistent
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok(), overrides)
    }

    /// Merge overrides, an environment lookup and a parsed config file
    ///
    /// # Errors
    ///
    /// Returns `Config` if the presence thresholds are inconsistent
    pub fn resolve(
        fc: GatewayConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let env_parse = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());
        let env_port = |key: &str| env(key).and_then(|s| s.trim().parse::<u16>().ok());

        // MQTT (cli > env > toml > default)
        let mqtt = MqttConfig {
            broker: overrides
                .broker
                .clone()
                .or_else(|| env("MQTT_BROKER"))
                .or(fc.mqtt.broker)
                .unwrap_or_else(|| DEFAULT_BROKER.to_string()),
            port: overrides
                .mqtt_port
                .or_else(|| env_port("MQTT_PORT"))
                .or(fc.mqtt.port)
                .unwrap_or(DEFAULT_MQTT_PORT),
            username: overrides
                .username
                .clone()
                .or_else(|| env("MQTT_USERNAME"))
                .or(fc.mqtt.username)
                .filter(|s| !s.is_empty()),
            password: overrides
                .password
                .clone()
                .or_else(|| env("MQTT_PASSWORD"))
                .or(fc.mqtt.password)
                .filter(|s| !s.is_empty()),
            client_id: env("MQTT_CLIENT_ID")
                .or(fc.mqtt.client_id)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_client_id),
            keep_alive: Duration::from_secs(
                fc.mqtt.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
            ),
            publish_timeout: Duration::from_secs(
                fc.mqtt
                    .publish_timeout_secs
                    .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS),
            ),
        };

        // HTTP API server (cli > env > toml > default)
        let server = ServerConfig {
            port: overrides
                .http_port
                .or_else(|| env_port("HTTP_PORT"))
                .or(fc.server.port)
                .unwrap_or(DEFAULT_HTTP_PORT),
        };

        // Presence (env > toml > default)
        let secs = |env_key: &str, file_value: Option<u64>, default: Duration| {
            env_parse(env_key)
                .or(file_value)
                .map_or(default, Duration::from_secs)
        };
        let presence = PresencePolicy::new(
            secs(
                "DEVICE_SWEEP_INTERVAL",
                fc.presence.sweep_interval_secs,
                DEFAULT_SWEEP_INTERVAL,
            ),
            secs(
                "DEVICE_OFFLINE_AFTER",
                fc.presence.offline_after_secs,
                DEFAULT_OFFLINE_AFTER,
            ),
            secs(
                "DEVICE_REAP_AFTER",
                fc.presence.reap_after_secs,
                DEFAULT_REAP_AFTER,
            ),
        )?;

        let default_topics = TopicConfig::default();
        let topics = TopicConfig {
            legacy_prefix: fc
                .topics
                .legacy_prefix
                .filter(|s| !s.is_empty())
                .unwrap_or(default_topics.legacy_prefix),
            default_family: fc
                .topics
                .default_family
                .filter(|s| !s.is_empty())
                .unwrap_or(default_topics.default_family),
        };

        Ok(Self {
            mqtt,
            server,
            presence,
            topics,
        })
    }
}
