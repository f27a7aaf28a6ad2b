//! Error types for the device gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the device gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Unknown device id
    #[error("device not found: {0}")]
    NotFound(String),

    /// Device is known but its liveness window expired
    #[error("device is offline: {0}")]
    DeviceOffline(String),

    /// Publish failed or the transport is not ready
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Decoded message is missing a required field
    #[error("validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
