//! Request extractors shared by handlers and middleware.

mod json;
mod principal;

pub use json::JsonBody;
pub use principal::{CurrentPrincipal, ResourceName};
