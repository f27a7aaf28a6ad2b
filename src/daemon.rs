//! Daemon - the main gateway service
//!
//! Wires the registry, MQTT transport, dispatcher, presence sweep and HTTP API
//! together and runs them until interrupted or terminated

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ApiServerBuilder;
use crate::devices::{CommandSender, DeviceRegistry, spawn_sweep};
use crate::dispatch::Dispatcher;
use crate::transport::{MqttTransport, Transport};
use crate::{Config, Result};

/// How long background tasks get to finish after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long the event loop gets to send the MQTT disconnect
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

/// The device gateway daemon
pub struct Daemon {
    config: Config,
    registry: Arc<DeviceRegistry>,
}

impl Daemon {
    /// Create a new daemon instance with an empty registry
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(DeviceRegistry::new()),
        }
    }

    /// Registry shared by every component
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Run the daemon until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns error if the API server cannot start or fails while running
    pub async fn run(self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let topics = self.config.topics.clone();

        let (mqtt, eventloop) =
            MqttTransport::connect(&self.config.mqtt, topics.subscriptions());
        let transport: Arc<dyn Transport> = Arc::new(mqtt.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&transport),
            topics.clone(),
        ));
        let commands = CommandSender::new(Arc::clone(&self.registry), transport, topics);

        // Cancelled separately so the disconnect can still be flushed
        let mqtt_shutdown = CancellationToken::new();
        let mut mqtt_task = tokio::spawn(eventloop.run(dispatcher, mqtt_shutdown.clone()));
        let sweep_task = spawn_sweep(
            Arc::clone(&self.registry),
            self.config.presence,
            shutdown.clone(),
        );
        let mut api_task = ApiServerBuilder::new(commands)
            .port(self.config.server.port)
            .shutdown(shutdown.clone())
            .build()
            .spawn();

        tracing::info!(
            broker = %self.config.mqtt.broker,
            mqtt_port = self.config.mqtt.port,
            http_port = self.config.server.port,
            "daemon running"
        );

        let api_result = tokio::select! {
            signal = shutdown_signal() => {
                tracing::info!(signal, "shutting down");
                None
            }
            result = &mut api_task => {
                tracing::warn!("API server exited, shutting down");
                Some(result)
            }
        };

        shutdown.cancel();
        if let Err(e) = mqtt.disconnect().await {
            tracing::debug!(error = %e, "mqtt disconnect not queued");
        }
        if tokio::time::timeout(DISCONNECT_FLUSH, &mut mqtt_task).await.is_err() {
            mqtt_shutdown.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, mqtt_task).await.is_err() {
                tracing::warn!("mqtt event loop did not stop in time");
            }
        }

        let api_result = match api_result {
            Some(result) => result,
            None => match tokio::time::timeout(SHUTDOWN_GRACE, api_task).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("API server did not stop in time");
                    Ok(Ok(()))
                }
            },
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, sweep_task).await.is_err() {
            tracing::warn!("presence sweep did not stop in time");
        }

        tracing::info!("daemon stopped");

        match api_result {
            Ok(result) => result,
            Err(e) => Err(crate::Error::Config(format!("API server task failed: {e}"))),
        }
    }
}

/// Wait for SIGINT or, on unix, SIGTERM and return the signal's name
///
/// A signal whose handler cannot be installed is logged and never fires.
pub async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGINT");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}
