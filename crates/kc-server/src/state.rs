//! Application state management.

use std::sync::Arc;

use kc_admin_api::AuditState;
use kc_audit::{AuditBackend, Clock, UpstreamProvider};

use crate::config::ServerConfig;

/// Application state shared across all request handlers.
pub struct AppState<S, U> {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Store backing the change log and mirror.
    pub store: Arc<S>,

    /// Audit API services.
    pub audit: AuditState<S, U>,
}

impl<S, U> Clone for AppState<S, U> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            store: Arc::clone(&self.store),
            audit: self.audit.clone(),
        }
    }
}

impl<S, U> AppState<S, U>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    /// Creates a new application state.
    pub fn new(config: ServerConfig, store: Arc<S>, upstream: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            audit: AuditState::new(Arc::clone(&store), upstream, clock),
            store,
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
