//! Per-request context handed to lifecycle hooks and services.

use crate::config::ResolvedResource;
use crate::permission::{Principal, SharedPrincipal};
use crate::query::QueryParams;

/// Built at request entry and dropped with the response.
#[derive(Clone)]
pub struct RequestContext {
    pub resource: ResolvedResource,
    pub principal: Option<SharedPrincipal>,
    pub params: QueryParams,
}

impl RequestContext {
    pub fn new(resource: ResolvedResource, principal: Option<SharedPrincipal>, params: QueryParams) -> Self {
        Self {
            resource,
            principal,
            params,
        }
    }

    pub fn principal(&self) -> Option<&dyn Principal> {
        self.principal.as_deref()
    }

    /// Principal id, or `"0"` when unauthenticated.
    pub fn user_id(&self) -> String {
        self.principal
            .as_ref()
            .map(|p| p.id())
            .unwrap_or_else(|| "0".to_string())
    }
}
