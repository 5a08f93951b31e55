use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use super::error::ApiError;
use super::extract::{Bearer, Params, Validated};
use crate::pipeline::OwnerSelector;
use crate::query::ListParams;
use crate::types::now_millis;
use crate::validation::{
    ChangePassword, CreateHospital, CreateRole, GenerateCode, Gate, Login, OneOf, UpdateHospital, VerifyCode,
};

type ApiResult<T> = Result<T, ApiError>;

pub async fn save(State(state): State<AppState>, Validated(input): Validated<CreateHospital>) -> ApiResult<impl IntoResponse> {
    let result = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "result": result }))))
}

pub async fn get_all(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_all().await?))
}

pub async fn list(State(state): State<AppState>, Params(params): Params<ListParams>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list(params).await?))
}

pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get_by_id(&id).await?))
}

pub async fn get_by_email(State(state): State<AppState>, Path(email): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.get_by_email(&email).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Validated(fields): Validated<UpdateHospital>,
) -> ApiResult<impl IntoResponse> {
    let result = state.service.update(&id, &fields).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
pub struct EmailCheck {
    pub email: String,
    /// The record being edited; it may keep its own email.
    #[serde(default)]
    pub id: Option<String>,
}

pub async fn email_available(State(state): State<AppState>, Params(q): Params<EmailCheck>) -> ApiResult<impl IntoResponse> {
    let conflict = state.service.find_email_conflict(q.id.as_deref(), &q.email).await?;
    Ok(Json(json!({ "available": conflict.is_none() })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub broker_id: Option<String>,
}

pub async fn stats(State(state): State<AppState>, Params(q): Params<StatsQuery>) -> ApiResult<impl IntoResponse> {
    Gate::default()
        .rule(OneOf(&["agentId", "brokerId"]))
        .check(&json!({ "agentId": q.agent_id, "brokerId": q.broker_id }))?;
    let owner = OwnerSelector::from_parts(q.agent_id, q.broker_id)?;
    Ok(Json(state.service.dashboard_stats(&owner).await?))
}

#[derive(Debug, Deserialize)]
pub struct CutoffQuery {
    /// Epoch milliseconds; defaults to now.
    #[serde(default)]
    pub cutoff: Option<i64>,
}

pub async fn unpaid(State(state): State<AppState>, Params(q): Params<CutoffQuery>) -> ApiResult<impl IntoResponse> {
    let cutoff = q.cutoff.unwrap_or_else(now_millis);
    Ok(Json(state.service.unpaid_members(cutoff).await?))
}

pub async fn deactivate_expired(
    State(state): State<AppState>,
    Params(q): Params<CutoffQuery>,
) -> ApiResult<impl IntoResponse> {
    let cutoff = q.cutoff.unwrap_or_else(now_millis);
    Ok(Json(state.service.deactivate_expired(cutoff).await?))
}

pub async fn create_role(State(state): State<AppState>, Validated(input): Validated<CreateRole>) -> ApiResult<impl IntoResponse> {
    let role = state.service.create_role(input).await?;
    Ok((StatusCode::CREATED, Json(json!({ "result": role }))))
}

pub async fn list_roles(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.list_roles().await?))
}

pub async fn login(State(state): State<AppState>, Validated(req): Validated<Login>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.login(req).await?))
}

pub async fn logout(State(state): State<AppState>, Bearer(token): Bearer) -> ApiResult<impl IntoResponse> {
    state.service.logout(&token).await?;
    Ok(Json(json!({ "loggedOut": true })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Bearer(token): Bearer,
    Validated(req): Validated<ChangePassword>,
) -> ApiResult<impl IntoResponse> {
    state.service.change_password(&token, req).await?;
    Ok(Json(json!({ "updated": true })))
}

pub async fn generate_code(State(state): State<AppState>, Validated(req): Validated<GenerateCode>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.generate_code(req).await?))
}

pub async fn verify_code(State(state): State<AppState>, Validated(req): Validated<VerifyCode>) -> ApiResult<impl IntoResponse> {
    let result = state.service.verify_code(req).await?;
    Ok(Json(json!({ "result": result })))
}
