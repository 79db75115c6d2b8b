use std::sync::Arc;

use sg_session::SessionRegistry;

use crate::service_control::ServiceControl;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub ssh: Arc<dyn ServiceControl>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, ssh: Arc<dyn ServiceControl>) -> Self {
        Self { registry, ssh }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
