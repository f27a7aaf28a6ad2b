//! HTTP control-plane API for the device gateway

pub mod devices;
pub mod health;
pub mod response;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::DEFAULT_HTTP_PORT;
use crate::devices::{CommandSender, DeviceRegistry};

pub use response::{ApiError, ApiResponse};

/// Path prefix for every endpoint
pub const API_PREFIX: &str = "/api/v1";

/// Shared state for API handlers
pub struct ApiState {
    /// Device registry
    pub registry: Arc<DeviceRegistry>,

    /// Command path to devices
    pub commands: CommandSender,
}

/// Builder for the API server
pub struct ApiServerBuilder {
    commands: CommandSender,
    port: u16,
    shutdown: Option<CancellationToken>,
}

impl ApiServerBuilder {
    /// Create a new builder around the command path; the registry is the
    /// one the sender checks presence against
    #[must_use]
    pub fn new(commands: CommandSender) -> Self {
        Self {
            commands,
            port: DEFAULT_HTTP_PORT,
            shutdown: None,
        }
    }

    /// Port to listen on
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Stop serving once the token is cancelled
    #[must_use]
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = ApiState {
            registry: Arc::clone(self.commands.registry()),
            commands: self.commands,
        };

        ApiServer {
            state: Arc::new(state),
            port: self.port,
            shutdown: self.shutdown,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    shutdown: Option<CancellationToken>,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let api = Router::new()
            .merge(health::router(self.state.clone()))
            .merge(devices::router(self.state.clone()));

        // CORS layer for cross-origin requests from dashboards
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest(API_PREFIX, api)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        let shutdown = self.shutdown.clone().unwrap_or_default();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
