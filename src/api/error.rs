//! HTTP error mapping with structured JSON bodies.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::errors::{FieldError, RegistryError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Every failure a handler can return. Store internals never reach the client.
#[derive(Debug)]
pub struct ApiError(pub RegistryError);

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RegistryError::Validation(_) | RegistryError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            RegistryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::DuplicateKey { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self.0 {
            RegistryError::Validation(errors) => ErrorDetail {
                code: "VALIDATION_FAILED",
                message: "request validation failed".into(),
                details: Some(errors),
            },
            RegistryError::InvalidParameter(msg) => {
                ErrorDetail { code: "INVALID_PARAMETER", message: msg, details: None }
            }
            RegistryError::Unauthorized(msg) => ErrorDetail { code: "UNAUTHORIZED", message: msg, details: None },
            RegistryError::NotFound(msg) => ErrorDetail { code: "NOT_FOUND", message: msg, details: None },
            RegistryError::DuplicateKey { field, .. } => ErrorDetail {
                code: "ALREADY_EXISTS",
                message: format!("a record with this {field} already exists"),
                details: Some(vec![FieldError::new(field, "already exists")]),
            },
            err @ RegistryError::QueryExecution { .. } => {
                log::error!("query execution failed: {err}");
                ErrorDetail { code: "QUERY_FAILED", message: "the query could not be executed".into(), details: None }
            }
            err => {
                log::error!("internal error: {err}");
                ErrorDetail { code: "INTERNAL", message: "an internal error occurred".into(), details: None }
            }
        };
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}
