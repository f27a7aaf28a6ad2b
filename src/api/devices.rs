//! Device registry API endpoints
//!
//! REST endpoints for listing and removing devices and for sending commands

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use super::response::{ApiError, ApiResponse};
use crate::devices::Device;

/// Device id fragments that select the legacy dialect when no topic is given
const LEGACY_ID_MARKERS: [&str; 2] = ["oppo", "android"];

/// REST request for sending a command
#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub device_id: String,
    pub command: String,
    /// Publish the bare command to this topic instead of the device's own
    #[serde(default)]
    pub topic: Option<String>,
}

/// REST response for a sent command
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub device_id: String,
    pub command: String,
    pub topic: String,
}

/// Build device routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices/{device_id}", get(get_device).delete(remove_device))
        .route("/command", post(send_command))
        .with_state(state)
}

/// List all known devices
async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<ApiResponse<Vec<Device>>> {
    let devices = state.registry.list_all().await;
    ApiResponse::ok(format!("{} devices", devices.len()), devices)
}

/// Get a specific device
async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Json<ApiResponse<Device>>, ApiError> {
    let device = state.registry.get(&device_id).await?;
    Ok(ApiResponse::ok("device found", device))
}

/// Forget a device; removing an unknown id still succeeds
async fn remove_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Json<ApiResponse<()>> {
    if state.registry.remove(&device_id).await.is_some() {
        ApiResponse::done(format!("device {device_id} removed"))
    } else {
        ApiResponse::done(format!("device {device_id} was not registered"))
    }
}

/// Publish a command to a device
async fn send_command(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> Result<Json<ApiResponse<CommandResponse>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if body.device_id.trim().is_empty() || body.command.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "device_id and command are required".to_string(),
        ));
    }

    let topic = match body.topic.as_deref().filter(|t| !t.is_empty()) {
        Some(topic) => {
            state.commands.send_to_topic(topic, &body.command).await?;
            topic.to_string()
        }
        None if uses_legacy_dialect(&body.device_id) => {
            state
                .commands
                .send_legacy_command(&body.device_id, &body.command)
                .await?
        }
        None => {
            state
                .commands
                .send_command(&body.device_id, &body.command)
                .await?
        }
    };

    Ok(ApiResponse::ok(
        "command sent",
        CommandResponse {
            device_id: body.device_id,
            command: body.command,
            topic,
        },
    ))
}

fn uses_legacy_dialect(device_id: &str) -> bool {
    let id = device_id.to_ascii_lowercase();
    LEGACY_ID_MARKERS.iter().any(|m| id.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_dialect_is_chosen_by_id() {
        assert!(uses_legacy_dialect("oppo-device"));
        assert!(uses_legacy_dialect("Android-42"));
        assert!(!uses_legacy_dialect("sensor-7"));
    }
}
