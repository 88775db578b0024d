use std::sync::Arc;

use crate::config::{Config, ServerOptions};
use crate::status::ServerStatus;

/// Process-wide collaborators injected into every connection and request.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub status: Arc<ServerStatus>,
}

impl ServerContext {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            status: Arc::new(ServerStatus::new()),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.config.server
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
