//! TOML configuration file loading
//!
//! Supports `~/.config/device-gateway/config.toml` (or `$DEVICE_GATEWAY_CONFIG`)
//! as a persistent config source. All fields are optional; the file is a
//! partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "DEVICE_GATEWAY_CONFIG";

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// Broker connection
    #[serde(default)]
    pub mqtt: MqttFileConfig,

    /// HTTP API server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Presence sweep thresholds
    #[serde(default)]
    pub presence: PresenceFileConfig,

    /// Legacy topic layout
    #[serde(default)]
    pub topics: TopicsFileConfig,
}

/// Broker connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct MqttFileConfig {
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub publish_timeout_secs: Option<u64>,
}

/// HTTP API server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

/// Presence sweep configuration, all in seconds
#[derive(Debug, Default, Deserialize)]
pub struct PresenceFileConfig {
    pub sweep_interval_secs: Option<u64>,
    pub offline_after_secs: Option<u64>,
    pub reap_after_secs: Option<u64>,
}

/// Legacy dialect topic configuration
#[derive(Debug, Default, Deserialize)]
pub struct TopicsFileConfig {
    /// First segment of legacy topics
    pub legacy_prefix: Option<String>,

    /// Family tag for devices without a `device_type`
    pub default_family: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GatewayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> GatewayConfigFile {
    config_file_path().map_or_else(GatewayConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> GatewayConfigFile {
    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GatewayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Return the config file path: `$DEVICE_GATEWAY_CONFIG` or
/// `~/.config/device-gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    directories::BaseDirs::new().map(|d| d.config_dir().join("device-gateway").join("config.toml"))
}
