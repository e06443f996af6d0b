//! Host-supplied route middleware, referenced from resource configs by name.

use crate::state::AppState;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;

/// Wraps a resource's route group, typically with `Router::layer`.
pub type RouteLayer = Arc<dyn Fn(Router<AppState>) -> Router<AppState> + Send + Sync>;

#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    layers: HashMap<String, RouteLayer>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, layer: F) -> Self
    where
        F: Fn(Router<AppState>) -> Router<AppState> + Send + Sync + 'static,
    {
        self.layers.insert(name.into(), Arc::new(layer));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    /// Apply the named layers in order; unknown names are skipped.
    pub fn apply<'a>(
        &self,
        mut router: Router<AppState>,
        resource: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Router<AppState> {
        for name in names {
            match self.layers.get(name) {
                Some(layer) => router = layer(router),
                None => {
                    tracing::warn!(resource = %resource, middleware = %name, "unknown route middleware; skipped")
                }
            }
        }
        router
    }
}
