//! One route group per configured resource, mounted under the configured prefix.

use super::MiddlewareRegistry;
use crate::error::{ConfigError, ErrorBody, InternalErrorDetail};
use crate::extractors::ResourceName;
use crate::handlers::{docs, resource as h};
use crate::permission::{require_permission, PermissionGate, RouteKind};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put, MethodRouter},
    Extension, Json, Router,
};
use tower_http::limit::RequestBodyLimitLayer;

fn gated(state: &AppState, kind: RouteKind, route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        PermissionGate::new(state.clone(), kind),
        require_permission,
    ))
}

/// Routes for one resource, relative to `/{resource}`. Bulk and soft-delete routes are always
/// registered so an unconfigured feature answers 400 rather than falling through to `/:id`.
pub fn resource_router(
    state: &AppState,
    name: &str,
    layers: &MiddlewareRegistry,
) -> Result<Router<AppState>, ConfigError> {
    let resolved = state.registry.resolve(name)?;
    let router = Router::new()
        .route(
            "/",
            gated(state, RouteKind::Index, get(h::index)).merge(gated(state, RouteKind::Store, post(h::store))),
        )
        .route("/bulk", gated(state, RouteKind::Bulk, post(h::bulk)))
        .route("/trashed", gated(state, RouteKind::Trashed, get(h::trashed)))
        .route("/docs", get(docs::resource_docs))
        .route("/meta", gated(state, RouteKind::Meta, get(docs::resource_metadata)))
        .route(
            "/:id",
            gated(state, RouteKind::Show, get(h::show))
                .merge(gated(state, RouteKind::Update, put(h::update).patch(h::update)))
                .merge(gated(state, RouteKind::Destroy, delete(h::destroy))),
        )
        .route("/:id/restore", gated(state, RouteKind::Restore, post(h::restore)))
        .route("/:id/force", gated(state, RouteKind::ForceDelete, delete(h::force_delete)))
        .layer(Extension(ResourceName::new(name)));

    let config = &resolved.config;
    let names = config
        .middleware
        .iter()
        .map(String::as_str)
        .chain(config.permissions.middleware.as_deref());
    Ok(layers.apply(router, name, names))
}

/// Replace internal error details with a generic message outside debug mode.
async fn redact_internal_errors(State(debug): State<bool>, response: Response) -> Response {
    if debug || response.extensions().get::<InternalErrorDetail>().is_none() {
        return response;
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: "Server Error".into(),
            code: "server_error",
            errors: None,
        }),
    )
        .into_response()
}

/// Every resource group plus `GET /docs`, under `settings.prefix`.
pub fn api_router(state: AppState, layers: &MiddlewareRegistry) -> Result<Router, ConfigError> {
    let settings = state.registry.settings();
    let (debug, body_limit) = (settings.debug, settings.body_limit);
    let prefix = settings.prefix.trim_matches('/').to_string();

    let mut api = Router::new().route("/docs", get(docs::all_docs));
    for name in state.registry.resource_names() {
        api = api.nest(&format!("/{}", name), resource_router(&state, name, layers)?);
        tracing::debug!(resource = %name, "registered resource routes");
    }
    let router = if prefix.is_empty() {
        api
    } else {
        Router::new().nest(&format!("/{}", prefix), api)
    };
    Ok(router
        .layer(middleware::map_response_with_state(debug, redact_internal_errors))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state))
}
