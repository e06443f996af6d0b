//! Resource CRUD handlers. Each builds a [`RequestContext`] and delegates to [`CrudService`].

use crate::config::{KeyType, ModelDefinition};
use crate::context::RequestContext;
use crate::error::AppError;
use crate::extractors::{CurrentPrincipal, JsonBody, ResourceName};
use crate::permission::SharedPrincipal;
use crate::query::QueryParams;
use crate::response::{BulkResponse, PageResponse};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::Value;

type Pairs = Query<Vec<(String, String)>>;

/// Parse a path id by the model's key type. Ids that cannot match any row are a 404.
pub fn parse_id(model: &ModelDefinition, raw: &str) -> Result<Value, AppError> {
    let not_found = || AppError::NotFound(format!("{} '{}'", model.name, raw));
    Ok(match model.key_type {
        KeyType::Int | KeyType::BigInt => Value::from(raw.trim().parse::<i64>().map_err(|_| not_found())?),
        KeyType::Uuid => {
            let id = uuid::Uuid::parse_str(raw.trim()).map_err(|_| not_found())?;
            Value::String(id.to_string())
        }
        KeyType::Text => Value::String(raw.to_string()),
    })
}

fn context(
    state: &AppState,
    resource: &ResourceName,
    principal: Option<SharedPrincipal>,
    pairs: Vec<(String, String)>,
) -> Result<RequestContext, AppError> {
    let resolved = state.registry.resolve(resource.as_str())?;
    Ok(RequestContext::new(resolved, principal, QueryParams::from_pairs(pairs)))
}

fn logged(ctx: &RequestContext) -> impl Fn(AppError) -> AppError + '_ {
    move |e| {
        e.log(&ctx.resource);
        e
    }
}

pub async fn index(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(pairs): Pairs,
) -> Result<Json<PageResponse>, AppError> {
    let ctx = context(&state, &resource, principal, pairs)?;
    CrudService::new(&state).index(&ctx).await.map(Json).map_err(logged(&ctx))
}

pub async fn trashed(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(pairs): Pairs,
) -> Result<Json<PageResponse>, AppError> {
    let ctx = context(&state, &resource, principal, pairs)?;
    CrudService::new(&state).trashed(&ctx).await.map(Json).map_err(logged(&ctx))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    Query(pairs): Pairs,
) -> Result<Json<Value>, AppError> {
    let ctx = context(&state, &resource, principal, pairs)?;
    let id = parse_id(&ctx.resource.model, &id).map_err(logged(&ctx))?;
    CrudService::new(&state).show(&ctx, &id).await.map(Json).map_err(logged(&ctx))
}

pub async fn store(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    let created = CrudService::new(&state).store(&ctx, body).await.map_err(logged(&ctx))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
    JsonBody(body): JsonBody,
) -> Result<Json<Value>, AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    let id = parse_id(&ctx.resource.model, &id).map_err(logged(&ctx))?;
    CrudService::new(&state)
        .update(&ctx, &id, body)
        .await
        .map(Json)
        .map_err(logged(&ctx))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    let id = parse_id(&ctx.resource.model, &id).map_err(logged(&ctx))?;
    CrudService::new(&state).destroy(&ctx, &id).await.map_err(logged(&ctx))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    let id = parse_id(&ctx.resource.model, &id).map_err(logged(&ctx))?;
    CrudService::new(&state).restore(&ctx, &id).await.map(Json).map_err(logged(&ctx))
}

pub async fn force_delete(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    let id = parse_id(&ctx.resource.model, &id).map_err(logged(&ctx))?;
    CrudService::new(&state)
        .force_delete(&ctx, &id)
        .await
        .map_err(logged(&ctx))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk(
    State(state): State<AppState>,
    Extension(resource): Extension<ResourceName>,
    CurrentPrincipal(principal): CurrentPrincipal,
    JsonBody(body): JsonBody,
) -> Result<Json<BulkResponse>, AppError> {
    let ctx = context(&state, &resource, principal, Vec::new())?;
    CrudService::new(&state).bulk(&ctx, body).await.map(Json).map_err(logged(&ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_parsed_by_key_type() {
        let mut model = ModelDefinition::new("user", "users");
        assert_eq!(parse_id(&model, "42").unwrap(), Value::from(42));
        assert!(matches!(parse_id(&model, "abc"), Err(AppError::NotFound(_))));

        model.key_type = KeyType::Uuid;
        assert!(matches!(parse_id(&model, "42"), Err(AppError::NotFound(_))));
        let id = "6f1c1e7c-4b1a-4c39-9a57-2f3f1b0c9d11";
        assert_eq!(parse_id(&model, id).unwrap(), Value::String(id.into()));

        model.key_type = KeyType::Text;
        assert_eq!(parse_id(&model, "slug-1").unwrap(), Value::String("slug-1".into()));
    }
}
