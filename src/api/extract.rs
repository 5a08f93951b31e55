use axum::Json;
use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use crate::errors::RegistryError;
use crate::validation::Schema;

/// A JSON body that already passed the gate of schema `S`. The handler
/// body only runs when extraction succeeds.
pub struct Validated<S: Schema>(pub S::Output);

#[async_trait]
impl<St, S> FromRequest<St> for Validated<S>
where
    St: Send + Sync,
    S: Schema,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|e| RegistryError::validation("body", e.body_text()))?;
        Ok(Self(S::validate(body)?))
    }
}

/// Query-string parameters; decoding failures become `InvalidParameter`.
pub struct Params<T>(pub T);

#[async_trait]
impl<St, T> FromRequestParts<St> for Params<T>
where
    St: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| RegistryError::InvalidParameter(e.body_text()))?;
        Ok(Self(value))
    }
}

/// The token from an `Authorization: Bearer <token>` header.
pub struct Bearer(pub String);

#[async_trait]
impl<St> FromRequestParts<St> for Bearer
where
    St: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, t)| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| Self(t.to_string()))
            .ok_or_else(|| RegistryError::Unauthorized("missing bearer token".into()).into())
    }
}
