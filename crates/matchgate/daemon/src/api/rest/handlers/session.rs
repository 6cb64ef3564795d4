//! Session handlers: signup, login, info, cancel, submit

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of `/info`. `pid` and `rating` are present only on success.
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i64>,
}

/// Body of `/cancel` and `/submit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

/// Register a new player; responds with its login credential as text.
pub async fn signup(State(state): State<AppState>) -> ApiResult<String> {
    let signed = state.service.signup().await.map_err(ApiError::text)?;
    Ok(signed.token)
}

/// Exchange a login credential for a match credential.
pub async fn login(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<String> {
    let signed = state.service.login(&token).await.map_err(ApiError::text)?;
    Ok(signed.token)
}

pub async fn info(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<InfoResponse>> {
    let player = state.service.info(&token).await.map_err(ApiError::json)?;
    Ok(Json(InfoResponse {
        success: true,
        pid: Some(player.pid.value()),
        rating: Some(player.rating),
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.service.cancel(&token).await.map_err(ApiError::json)?;
    Ok(StatusResponse::ok())
}

/// Record a game result. Duplicate submissions also report success.
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state.service.submit(&token).await.map_err(ApiError::json)?;
    Ok(StatusResponse::ok())
}
