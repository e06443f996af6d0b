//! Route-level permission gate.

use super::{check, derive_action, RouteDescriptor, RouteKind};
use crate::error::AppError;
use crate::extractors::{CurrentPrincipal, ResourceName};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use serde_json::Value;

/// State for one gated route: the app plus the route kind fixed at registration.
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub route: Option<RouteKind>,
}

impl PermissionGate {
    pub fn new(state: AppState, route: RouteKind) -> Self {
        Self {
            state,
            route: Some(route),
        }
    }
}

/// Path below the resource segment, e.g. `/api/posts/:id/force` -> `/:id/force`.
fn relative_pattern(path: &str, resource: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.iter().position(|s| *s == resource) {
        Some(i) => format!("/{}", segments[i + 1..].join("/")),
        None => path.to_string(),
    }
}

/// Read `operation` from a bulk payload, then hand the body back to the request.
async fn peek_bulk_operation(request: Request, limit: usize) -> Result<(Request, Option<String>), AppError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable request body: {}", e)))?;
    let operation = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|v| v.get("operation").and_then(Value::as_str).map(String::from));
    Ok((Request::from_parts(parts, Body::from(bytes)), operation))
}

/// Derive the action, enforce the permission, and record the action as a request extension.
/// Routes with no derivable action pass through.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Extension(resource): Extension<ResourceName>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let registry = &gate.state.registry;
    let resolved = registry.resolve(resource.as_str())?;
    let pattern = matched
        .as_ref()
        .map(|m| relative_pattern(m.as_str(), resource.as_str()))
        .unwrap_or_else(|| relative_pattern(request.uri().path(), resource.as_str()));
    let is_bulk = match gate.route {
        Some(kind) => kind == RouteKind::Bulk,
        None => pattern == "/bulk",
    };
    let (mut request, bulk_operation) = if is_bulk {
        peek_bulk_operation(request, registry.settings().body_limit).await?
    } else {
        (request, None)
    };
    let descriptor = RouteDescriptor {
        method: request.method().clone(),
        name: gate.route.map(|k| k.route_name(resource.as_str())),
        pattern,
        bulk_operation,
    };
    let Some(action) = derive_action(&descriptor) else {
        return Ok(next.run(request).await);
    };
    if let Err(e) = check(
        &registry.settings().permissions,
        &resolved.config,
        action,
        principal.as_deref(),
    ) {
        tracing::debug!(resource = %resource.as_str(), action = action.as_str(), error = %e, "permission denied");
        return Err(e);
    }
    request.extensions_mut().insert(action);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_is_taken_below_the_resource_segment() {
        assert_eq!(relative_pattern("/api/posts/:id/force", "posts"), "/:id/force");
        assert_eq!(relative_pattern("/api/bulk/bulk", "bulk"), "/bulk");
        assert_eq!(relative_pattern("/api/posts", "posts"), "/");
    }
}
