use std::sync::Arc;

use lightbake_baker::Baker;
use lightbake_jobs::JobRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// In-memory job table shared by every request.
    pub registry: JobRegistry,
    /// Bake submission service.
    pub baker: Arc<Baker>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: JobRegistry::new(),
            baker: Arc::new(Baker::new(config.baker.clone())),
            config: Arc::new(config),
        }
    }
}
