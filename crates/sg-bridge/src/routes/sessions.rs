//! Terminal session API routes.
//!
//! The surface is poll-based: clients submit input, then repeatedly fetch
//! `/output` to receive whatever the shell has produced since their last
//! call. Creating and closing sessions can block on process spawn and
//! termination, so those run on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sg_session::{SessionId, SessionSummary};
use tracing::debug;

use crate::api_error::ApiError;
use crate::state::AppState;

/// Response header carrying the session state alongside raw output bytes.
pub const SESSION_STATE_HEADER: &str = "x-session-state";

pub fn sessions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/{id}",
            get(get_session).delete(close_session),
        )
        .route("/api/sessions/{id}/input", post(submit_input))
        .route("/api/sessions/{id}/output", get(read_output))
        .route("/api/sessions/{id}/scrollback", get(scrollback))
        .route("/api/sessions/{id}/resize", post(resize_session))
        .route("/api/sessions/{id}/history", get(get_history))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InputRequest {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionSummary>), ApiError> {
    let registry = Arc::clone(&state.registry);
    let summary = tokio::task::spawn_blocking(move || {
        let id = registry.create()?;
        registry.summary(id)
    })
    .await??;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list())
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(state.registry.summary(id)?))
}

/// Always succeeds; `closed` tells whether this request did the closing.
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let registry = Arc::clone(&state.registry);
    let closed = tokio::task::spawn_blocking(move || registry.close(id)).await?;
    Ok(Json(json!({ "id": id, "closed": closed })))
}

pub async fn submit_input(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    body: Result<Json<InputRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    debug!(session_id = %id, bytes = req.data.len(), "input");
    state.registry.submit_input(id, req.data.as_bytes())?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn read_output(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let (bytes, session_state) = state.registry.poll_output(id)?;
    Ok((
        [
            ("content-type", "application/octet-stream"),
            (SESSION_STATE_HEADER, session_state.as_str()),
        ],
        bytes,
    ))
}

pub async fn scrollback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.registry.scrollback(id)?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

pub async fn resize_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    body: Result<Json<ResizeRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = body?;
    state.registry.resize(id, req.rows, req.cols)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.registry.get_history(id)?))
}
