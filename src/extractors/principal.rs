//! Read the authenticated principal and the target resource from request extensions.

use crate::permission::SharedPrincipal;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;

/// Principal inserted by the host's authentication layer. `None` when unauthenticated.
#[derive(Clone)]
pub struct CurrentPrincipal(pub Option<SharedPrincipal>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentPrincipal(parts.extensions.get::<SharedPrincipal>().cloned()))
    }
}

/// Resource a route group was registered for; attached as an extension on every resource route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceName(pub Arc<str>);

impl ResourceName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
