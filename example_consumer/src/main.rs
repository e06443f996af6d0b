//! Demo server: serves the resources in `resources.json` (or `CONFIG_PATH`).
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Uses PostgreSQL when `DATABASE_URL` is set, an in-memory store otherwise.
//! Callers identify themselves with `x-user-id`, `x-roles` and `x-permissions` headers.

use async_trait::async_trait;
use axum::{extract::Request, middleware::Next, response::Response, Router};
use crud_api_sdk::{
    api_router, common_routes, load_from_file, AppError, AppState, DataStore, LogicRegistry, MemoryStore,
    MiddlewareRegistry, PgStore, Record, RequestContext, ResourceLogic, ResourceRegistry, SharedPrincipal,
    StaticPrincipal,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Posts default to `draft` and can only be deleted while unpublished.
struct PostLogic;

#[async_trait]
impl ResourceLogic for PostLogic {
    async fn before_create(&self, mut data: Record, _ctx: &RequestContext) -> Result<Record, AppError> {
        data.entry("status").or_insert_with(|| Value::from("draft"));
        Ok(data)
    }

    async fn before_delete(&self, record: &Record, _ctx: &RequestContext) -> Result<bool, AppError> {
        Ok(record.get("status").and_then(Value::as_str) != Some("published"))
    }
}

fn header_list(request: &Request, name: &str) -> Vec<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Stand-in for real authentication: trusts the identity headers.
async fn header_auth(mut request: Request, next: Next) -> Response {
    if let Some(id) = header_list(&request, "x-user-id").into_iter().next() {
        let principal = header_list(&request, "x-roles")
            .into_iter()
            .fold(StaticPrincipal::new(id), |p, role| p.with_role(role));
        let principal = header_list(&request, "x-permissions")
            .into_iter()
            .fold(principal, |p, perm| p.with_permission(perm));
        request.extensions_mut().insert::<SharedPrincipal>(principal.shared());
    }
    next.run(request).await
}

async fn audit(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, %path, status = response.status().as_u16(), "resource request");
    response
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crud_api_sdk=info,example_consumer=info")),
        )
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "example_consumer/resources.json".into());
    let config = load_from_file(&config_path).await?;
    let logic = LogicRegistry::new().register("posts", Arc::new(PostLogic));
    let registry = ResourceRegistry::build(config, logic)?;

    let store: Arc<dyn DataStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => Arc::new(PgStore::connect(&url).await?),
        Err(_) => {
            tracing::info!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let state = AppState::new(registry, store);
    let middleware = MiddlewareRegistry::new().register("audit", |r| r.layer(axum::middleware::from_fn(audit)));

    let app = Router::new()
        .merge(common_routes(state.clone()))
        .merge(api_router(state, &middleware)?)
        .layer(axum::middleware::from_fn(header_auth));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
