//! MQTT transport over `rumqttc`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::config::MqttConfig;
use crate::dispatch::{Dispatcher, INBOUND_QUEUE_CAPACITY, InboundMessage};
use crate::protocol::topics::DEFAULT_QOS;
use crate::{Error, Result};

/// Capacity of the client request channel
const REQUEST_CAPACITY: usize = 64;

/// Pause after a failed poll before reconnecting
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Publishing half of an MQTT connection
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    publish_timeout: Duration,
    connected: Arc<AtomicBool>,
}

/// Inbound half of an MQTT connection; drive it with [`MqttEventLoop::run`]
pub struct MqttEventLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    connected: Arc<AtomicBool>,
}

impl MqttTransport {
    /// Build a client for the configured broker
    ///
    /// No network traffic happens until the returned event loop is polled.
    #[must_use]
    pub fn connect(config: &MqttConfig, subscriptions: Vec<String>) -> (Self, MqttEventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tracing::info!(
            broker = %config.broker,
            port = config.port,
            client_id = %config.client_id,
            "mqtt client created"
        );

        let connected = Arc::new(AtomicBool::new(false));
        let transport = Self {
            client: client.clone(),
            publish_timeout: config.publish_timeout,
            connected: Arc::clone(&connected),
        };
        let eventloop = MqttEventLoop {
            eventloop,
            client,
            subscriptions,
            connected,
        };
        (transport, eventloop)
    }

    /// Whether the broker has acknowledged the current session
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send an MQTT disconnect
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the request cannot be queued
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<()> {
        // The client only queues requests, so nothing would report a dead link
        if !self.is_connected() {
            return Err(Error::Transport(format!(
                "publish to {topic} failed: not connected to broker"
            )));
        }

        tokio::time::timeout(
            self.publish_timeout,
            self.client.publish(topic, qos, retain, payload),
        )
        .await
        .map_err(|_| {
            Error::Transport(format!(
                "publish to {topic} timed out after {}s",
                self.publish_timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Transport(e.to_string()))
    }
}

impl MqttEventLoop {
    /// Poll the connection until `shutdown` is cancelled or a disconnect has
    /// been sent
    ///
    /// Subscriptions are re-issued after every `ConnAck`. Inbound publishes
    /// go to a single dispatch worker in delivery order; polling waits while
    /// the worker's queue is full.
    pub async fn run(mut self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
        let (inbound, worker) = dispatcher.spawn_worker(INBOUND_QUEUE_CAPACITY);

        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!(code = ?ack.code, "connected to broker");
                    self.set_connected(true);
                    self.spawn_subscribe();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    let sent = tokio::select! {
                        () = shutdown.cancelled() => break,
                        sent = inbound.send(message) => sent,
                    };
                    if sent.is_err() {
                        tracing::error!("dispatch worker stopped, closing event loop");
                        break;
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    tracing::info!("disconnected from broker");
                    self.set_connected(false);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_connected(false);
                    tracing::error!(error = %e, "mqtt connection error");
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }

        self.set_connected(false);

        // Queued messages still reach the registry; their replies fail fast
        drop(inbound);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "dispatch worker failed");
        }

        tracing::info!("mqtt event loop stopped");
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    // Subscribing goes through the request channel this loop drains, so it
    // must not be awaited inline
    fn spawn_subscribe(&self) {
        let client = self.client.clone();
        let topics = self.subscriptions.clone();
        tokio::spawn(async move {
            for topic in topics {
                match client.subscribe(&topic, DEFAULT_QOS).await {
                    Ok(()) => tracing::info!(topic = %topic, "subscribed"),
                    Err(e) => tracing::error!(topic = %topic, error = %e, "subscribe failed"),
                }
            }
        });
    }
}
