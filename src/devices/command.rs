//! Command delivery to registered devices

use std::sync::Arc;

use super::registry::DeviceRegistry;
use crate::Result;
use crate::protocol::topics::{self, DEFAULT_QOS};
use crate::protocol::{Envelope, TopicConfig};
use crate::transport::Transport;

/// Publishes commands to devices in either dialect
///
/// Presence checks read a registry snapshot; the publish itself happens after
/// the registry lock is released.
#[derive(Clone)]
pub struct CommandSender {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn Transport>,
    topics: TopicConfig,
}

impl CommandSender {
    /// Create a command sender
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        transport: Arc<dyn Transport>,
        topics: TopicConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            topics,
        }
    }

    /// Send a structured command envelope to `device/command/{id}`
    ///
    /// Returns the topic the command was published to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown devices, `DeviceOffline` for offline
    /// ones, and `Transport` if the publish fails
    pub async fn send_command(&self, id: &str, command: &str) -> Result<String> {
        self.registry.command_target(id).await?;

        let topic = topics::command_topic(id);
        let payload = Envelope::command(id, command).to_bytes()?;
        self.transport
            .publish(&topic, DEFAULT_QOS, false, payload)
            .await?;

        tracing::info!(device_id = %id, command = %command, topic = %topic, "command sent");
        Ok(topic)
    }

    /// Send a bare command string on the device family's legacy topic
    ///
    /// Returns the topic the command was published to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown devices, `DeviceOffline` for offline
    /// ones, and `Transport` if the publish fails
    pub async fn send_legacy_command(&self, id: &str, command: &str) -> Result<String> {
        let device = self.registry.command_target(id).await?;

        let family = device
            .family()
            .unwrap_or(self.topics.default_family.as_str());
        let topic = self.topics.legacy_command_topic(family);
        self.transport
            .publish(&topic, DEFAULT_QOS, false, command.as_bytes().to_vec())
            .await?;

        tracing::info!(device_id = %id, command = %command, topic = %topic, "legacy command sent");
        Ok(topic)
    }

    /// Publish a bare command to an explicit topic, bypassing the registry
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the publish fails
    pub async fn send_to_topic(&self, topic: &str, command: &str) -> Result<()> {
        self.transport
            .publish(topic, DEFAULT_QOS, false, command.as_bytes().to_vec())
            .await?;

        tracing::info!(topic = %topic, command = %command, "command published to explicit topic");
        Ok(())
    }

    /// Registry the sender checks presence against
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::Error;
    use crate::transport::RecordingTransport;

    fn sender_with(transport: Arc<RecordingTransport>) -> CommandSender {
        CommandSender::new(
            Arc::new(DeviceRegistry::new()),
            transport,
            TopicConfig::default(),
        )
    }

    #[tokio::test]
    async fn structured_command_publishes_envelope() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = sender_with(transport.clone());
        sender.registry().register("d1", "c1", HashMap::new()).await;

        let topic = sender.send_command("d1", "reboot").await.unwrap();
        assert_eq!(topic, "device/command/d1");

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "device/command/d1");
        let json = published[0].json();
        assert_eq!(json["action"], "command");
        assert_eq!(json["command"], "reboot");
        assert_eq!(json["device_id"], "d1");
    }

    #[tokio::test]
    async fn offline_device_gets_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = sender_with(transport.clone());
        sender.registry().register("d1", "c1", HashMap::new()).await;
        sender.registry().mark_offline("d1").await;

        assert!(matches!(
            sender.send_command("d1", "reboot").await,
            Err(Error::DeviceOffline(_))
        ));
        assert!(matches!(
            sender.send_legacy_command("d1", "reboot").await,
            Err(Error::DeviceOffline(_))
        ));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = sender_with(transport.clone());

        assert!(matches!(
            sender.send_command("ghost", "reboot").await,
            Err(Error::NotFound(_))
        ));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn legacy_command_uses_family_topic() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = sender_with(transport.clone());
        let attrs = HashMap::from([("device_type".to_string(), "oppo".to_string())]);
        sender.registry().register("d1", "c1", attrs).await;

        let topic = sender.send_legacy_command("d1", "reboot").await.unwrap();
        assert_eq!(topic, "device/oppo/restart4g");

        let published = transport.published();
        assert_eq!(published[0].topic, "device/oppo/restart4g");
        assert_eq!(published[0].text(), "reboot");
    }

    #[tokio::test]
    async fn legacy_command_falls_back_to_default_family() {
        let transport = Arc::new(RecordingTransport::default());
        let sender = CommandSender::new(
            Arc::new(DeviceRegistry::new()),
            transport.clone(),
            TopicConfig {
                legacy_prefix: "phones".to_string(),
                default_family: "generic".to_string(),
            },
        );
        sender.registry().register("d1", "c1", HashMap::new()).await;

        sender.send_legacy_command("d1", "restart").await.unwrap();
        assert_eq!(transport.published()[0].topic, "phones/generic/restart4g");
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let transport = Arc::new(RecordingTransport::failing());
        let sender = sender_with(transport);
        sender.registry().register("d1", "c1", HashMap::new()).await;

        assert!(matches!(
            sender.send_command("d1", "reboot").await,
            Err(Error::Transport(_))
        ));
    }
}
