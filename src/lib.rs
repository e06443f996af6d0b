//! CRUD API SDK: configuration-driven REST resources on axum.
//!
//! A JSON document declares models and resources; [`api_router`] turns it into list, show,
//! create, update, delete, bulk and soft-delete endpoints with validation, permission checks
//! and per-resource lifecycle hooks ([`ResourceLogic`]).

pub mod config;
pub mod context;
pub mod docs;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod logic;
pub mod permission;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{from_json_str, load_from_file, FullConfig, ResolvedResource, ResourceRegistry};
pub use context::RequestContext;
pub use error::{AppError, ConfigError, StoreError};
pub use extractors::CurrentPrincipal;
pub use logic::{DefaultLogic, LogicRegistry, ResourceLogic};
pub use permission::{Action, Principal, SharedPrincipal, StaticPrincipal};
pub use query::Query;
pub use routes::{api_router, common_routes, MiddlewareRegistry};
pub use service::CrudService;
pub use state::AppState;
pub use store::{DataStore, MemoryStore, PgStore, Record};
