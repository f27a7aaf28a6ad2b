//! Inbound topic dispatch
//!
//! Every message the transport delivers is classified by [`inbound::parse`]
//! and then applied to the registry. Failures are logged and the message is
//! dropped; nothing is reported back to the transport.
//!
//! The transport feeds messages through [`Dispatcher::spawn_worker`], which
//! applies them one at a time in delivery order.

pub mod inbound;

use std::collections::HashMap;
use std::sync::Arc;

pub use inbound::{Inbound, Registration};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::devices::types::ATTR_DEVICE_TYPE;
use crate::devices::{DeviceRegistry, StatusUpdate};
use crate::protocol::topics::{self, DEFAULT_QOS};
use crate::protocol::{Envelope, TopicConfig};
use crate::transport::Transport;
use crate::{Error, Result};

/// Capacity of the queue between the transport and the dispatch worker
pub const INBOUND_QUEUE_CAPACITY: usize = 100;

/// A message received from the broker, waiting to be dispatched
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Routes inbound messages to registry operations and replies
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    transport: Arc<dyn Transport>,
    topics: TopicConfig,
}

impl Dispatcher {
    /// Create a dispatcher over a shared registry
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

    /// Handle one inbound message
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        tracing::debug!(topic = %topic, bytes = payload.len(), "inbound message");

        let message = match inbound::parse(topic, payload, &self.topics.legacy_prefix) {
            Ok(message) => message,
            Err(Error::Decode(e)) => {
                tracing::warn!(
                    topic = %topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "undecodable message dropped"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "invalid message dropped");
                return;
            }
        };

        let kind = message.kind();
        if let Err(e) = self.apply(message).await {
            tracing::warn!(topic = %topic, kind, error = %e, "failed to apply message");
        }
    }

    /// Start a task that handles queued messages sequentially
    ///
    /// Messages are applied in the order they were sent. Senders wait once
    /// `capacity` messages are pending. The task ends after every sender is
    /// dropped and the queue is drained.
    #[must_use]
    pub fn spawn_worker(
        self: Arc<Self>,
        capacity: usize,
    ) -> (mpsc::Sender<InboundMessage>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<InboundMessage>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                self.handle(&message.topic, &message.payload).await;
            }
            tracing::debug!("dispatch worker stopped");
        });
        (tx, handle)
    }

    /// Apply a classified message to the registry
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when a status or heartbeat names an unknown device,
    /// and `Transport` if the register acknowledgement cannot be published
    pub async fn apply(&self, message: Inbound) -> Result<()> {
        match message {
            Inbound::LegacyStatus { family, status } => {
                self.apply_legacy_status(&family, status).await
            }
            Inbound::LegacyCommandEcho { family } => {
                tracing::debug!(family = %family, "ignoring legacy command topic");
                Ok(())
            }
            Inbound::Register(registration) => self.apply_register(registration).await,
            Inbound::Status(status) => {
                let id = status.device_id.clone();
                self.registry.update_status(&id, &status).await
            }
            Inbound::Heartbeat { device_id } => self.registry.heartbeat(&device_id).await,
            Inbound::Offline { device_id } => {
                if !self.registry.mark_offline(&device_id).await {
                    tracing::debug!(device_id = %device_id, "offline notice for unknown device");
                }
                Ok(())
            }
            Inbound::Response { device_id, action } => {
                tracing::info!(device_id = %device_id, action = %action, "device response");
                Ok(())
            }
            Inbound::Unknown { topic } => {
                tracing::warn!(topic = %topic, "message on unhandled topic");
                Ok(())
            }
        }
    }

    async fn apply_legacy_status(&self, family: &str, status: String) -> Result<()> {
        let device_id = inbound::legacy_device_id(family);
        let attributes = HashMap::from([
            (ATTR_DEVICE_TYPE.to_string(), family.to_string()),
            ("platform".to_string(), "android".to_string()),
            ("client_type".to_string(), "android_mqtt".to_string()),
        ]);

        self.registry
            .ensure_registered(&device_id, &inbound::legacy_client_id(family), attributes)
            .await;

        let update = StatusUpdate {
            device_id: device_id.clone(),
            network_status: status,
            timestamp: chrono::Utc::now().timestamp(),
            last_action: Some(inbound::LEGACY_STATUS_LABEL.to_string()),
        };
        self.registry.update_status(&device_id, &update).await
    }

    async fn apply_register(&self, registration: Registration) -> Result<()> {
        let Registration {
            device_id,
            client_id,
            attributes,
        } = registration;

        self.registry
            .register(&device_id, &client_id, attributes)
            .await;

        let topic = topics::response_topic(&device_id);
        let payload = Envelope::register_ack(&device_id).to_bytes()?;
        self.transport
            .publish(&topic, DEFAULT_QOS, false, payload)
            .await?;

        tracing::debug!(device_id = %device_id, topic = %topic, "register ack sent");
        Ok(())
    }

    /// Registry this dispatcher mutates
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Topic configuration in use
    #[must_use]
    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }
}
