//! Typed errors and HTTP mapping.

use crate::config::ResolvedResource;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),
    #[error("resource '{0}' has no model reference")]
    MissingModel(String),
    #[error("missing reference: {kind} '{id}' (resource '{resource}')")]
    MissingReference {
        kind: &'static str,
        id: String,
        resource: String,
    },
    #[error("resource name '{0}' collides with a reserved route")]
    ReservedName(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Data-layer failures, independent of the backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("{0}")]
    Backend(String),
}

/// Per-field validation messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Single-field failure, for checks made outside the rule engine.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Unauthenticated.")]
    NotAuthenticated,
    #[error("missing permission: {0}")]
    PermissionDenied(String),
    #[error("This action is unauthorized.")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("The given data was invalid.")]
    Validation(ValidationErrors),
    #[error("operation vetoed: {0}")]
    Vetoed(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound("record".into()),
            StoreError::UniqueViolation(c) => AppError::Conflict(c),
            other => AppError::Store(other),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self {
        AppError::Validation(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated => StatusCode::FORBIDDEN,
            AppError::PermissionDenied(_) | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Vetoed(_) | AppError::Unsupported(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration_error",
            AppError::NotAuthenticated => "unauthenticated",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Vetoed(_) => "operation_vetoed",
            AppError::Unsupported(_) => "unsupported_feature",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Store(_) => "database_error",
            AppError::Internal(_) => "server_error",
        }
    }

    /// Log once at the request boundary with resource/model context. Configuration errors are
    /// logged when rendered since they can occur before a resource resolves.
    pub fn log(&self, resource: &ResolvedResource) {
        let name = resource.config.name.as_str();
        let model = resource.model.name.as_str();
        match self {
            AppError::Store(_) | AppError::Internal(_) => {
                tracing::error!(resource = %name, model = %model, error = %self, "request failed");
            }
            _ => {
                tracing::debug!(resource = %name, model = %model, error = %self, "request rejected");
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

/// Marker attached to 500 responses so the redaction layer can hide details outside debug mode.
#[derive(Clone, Debug)]
pub struct InternalErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        if let AppError::Config(e) = &self {
            tracing::error!(error = %e, "configuration error");
        }
        let errors = match &self {
            AppError::Validation(errors) => Some(errors.clone()),
            _ => None,
        };
        let body = ErrorBody {
            message: self.to_string(),
            code,
            errors,
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            response
                .extensions_mut()
                .insert(InternalErrorDetail(self.to_string()));
        }
        response
    }
}
