//! Documentation and form-metadata handlers.

use crate::docs::{aggregate_document, resource_document, resource_meta};
use crate::error::AppError;
use crate::extractors::ResourceName;
use crate::state::AppState;
use axum::{extract::State, Extension, Json};
use serde_json::Value;
use utoipa::openapi::OpenApi;

/// `GET /{resource}/docs`
pub async fn resource_docs(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
) -> Result<Json<OpenApi>, AppError> {
    let resolved = state.registry.resolve(resource.as_str())?;
    Ok(Json(resource_document(state.registry.settings(), &resolved)))
}

/// `GET /{resource}/meta`
pub async fn resource_metadata(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
) -> Result<Json<Value>, AppError> {
    let resolved = state.registry.resolve(resource.as_str())?;
    Ok(Json(resource_meta(&resolved)))
}

/// `GET /docs`: every resource in one document.
pub async fn all_docs(State(state): State<AppState>) -> Result<Json<OpenApi>, AppError> {
    Ok(Json(aggregate_document(&state.registry)?))
}
