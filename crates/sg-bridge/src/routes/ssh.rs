//! SSH daemon control routes.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::api_error::ApiError;
use crate::service_control::SshConnection;
use crate::state::AppState;

pub fn ssh_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ssh/status", get(ssh_status))
        .route("/api/ssh/start", post(start_ssh))
        .route("/api/ssh/stop", post(stop_ssh))
        .route("/api/ssh/connections", get(list_connections))
}

/// A failed connection listing degrades to a zero count rather than
/// failing the whole status request.
pub async fn ssh_status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let active = state.ssh.is_active().await?;
    let connections = match state.ssh.connections().await {
        Ok(conns) => conns.len(),
        Err(e) => {
            warn!(error = %e, "could not list ssh connections");
            0
        }
    };
    Ok(Json(json!({ "active": active, "connections": connections })))
}

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SshConnection>>, ApiError> {
    Ok(Json(state.ssh.connections().await?))
}

pub async fn start_ssh(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let success = state.ssh.start().await?;
    Ok(Json(json!({ "success": success })))
}

pub async fn stop_ssh(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let success = state.ssh.stop().await?;
    Ok(Json(json!({ "success": success })))
}
