//! Device Gateway - MQTT presence registry and command router
//!
//! This library provides the core functionality for the device gateway:
//! - A concurrent registry of devices with presence tracking
//! - Topic dispatch for the structured JSON dialect and the legacy
//!   plain-text dialect
//! - A periodic presence sweep that ages out quiet devices
//! - Command delivery and an HTTP control plane
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   MQTT broker                        │
//! └──────────┬───────────────────────────▲──────────────┘
//!            │ inbound                   │ publish
//! ┌──────────▼──────────┐     ┌──────────┴──────────────┐
//! │     Dispatcher      │     │     CommandSender       │◄── HTTP API
//! └──────────┬──────────┘     └──────────┬──────────────┘
//!            │                           │
//! ┌──────────▼───────────────────────────▼──────────────┐
//! │          DeviceRegistry  ◄──  presence sweep         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod daemon;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::{Config, ConfigOverrides};
pub use daemon::Daemon;
pub use devices::{CommandSender, Device, DeviceRegistry, PresencePolicy, StatusUpdate};
pub use dispatch::{Dispatcher, Inbound};
pub use error::{Error, Result};
pub use protocol::{Envelope, TopicConfig};
pub use transport::{MqttTransport, Transport};
