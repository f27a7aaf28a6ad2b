//! Health check endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;
use super::response::ApiResponse;

/// Health payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub devices: usize,
}

/// Liveness check with the current registry size
async fn health(State(state): State<Arc<ApiState>>) -> Json<ApiResponse<HealthResponse>> {
    ApiResponse::ok(
        "service is running",
        HealthResponse {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            devices: state.registry.len().await,
        },
    )
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
