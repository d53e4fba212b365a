//! Server state and configuration.

use std::sync::Arc;

use crate::service::Service;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub service: Arc<Service>,
}

impl AppState {
    pub fn new(config: ServerConfig, service: Arc<Service>) -> Self {
        Self { config, service }
    }
}
