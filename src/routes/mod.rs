//! Router assembly: per-resource route groups, aggregate docs, common routes.

mod common;
mod middleware;
mod resource;

pub use common::common_routes;
pub use middleware::{MiddlewareRegistry, RouteLayer};
pub use resource::{api_router, resource_router};
