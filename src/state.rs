//! Shared application state for all routes.

use crate::config::ResourceRegistry;
use crate::store::DataStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Built once at startup; read-only afterwards.
    pub registry: Arc<ResourceRegistry>,
    pub store: Arc<dyn DataStore>,
}

impl AppState {
    pub fn new(registry: ResourceRegistry, store: Arc<dyn DataStore>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
        }
    }
}
