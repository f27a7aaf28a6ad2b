//! Publish/subscribe transport
//!
//! The dispatcher and the command path only need to publish; inbound
//! delivery is driven by the transport's own event loop.

pub mod mqtt;
pub mod recording;

use async_trait::async_trait;
pub use rumqttc::QoS;

use crate::Result;

pub use mqtt::{MqttEventLoop, MqttTransport};
pub use recording::{Published, RecordingTransport};

/// Outbound side of the transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload to a topic
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the publish is rejected, times out, or the
    /// connection is not ready
    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()>;
}
