//! HTTP surface for shellgate.
//!
//! Exposes the session registry as a poll-based JSON/bytes API and the SSH
//! daemon controls. Build the full router with [`api_router`].

pub mod api_error;
pub mod routes;
pub mod service_control;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use api_error::ApiError;
pub use service_control::{ServiceControl, ServiceError, SshConnection, SystemctlServiceControl};
pub use state::AppState;

/// Build the API router with every route mounted.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::sessions::sessions_router())
        .merge(routes::ssh::ssh_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
