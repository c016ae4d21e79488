use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::{AppJson, AuthUser},
    models::ledger::{ProgressFlushRequest, ScoreFlushRequest},
    services::{ledger_service::LedgerService, AppState},
};

/// POST /api/v1/user/progress
pub async fn save_progress(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<ProgressFlushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = LedgerService::new(&state)
        .record_progress(&user_id, req)
        .await?;
    Ok(Json(json!({ "saved": saved })))
}

/// POST /api/v1/user/score
pub async fn save_score(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<ScoreFlushRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = LedgerService::new(&state).record_score(&user_id, req).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /api/v1/user/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let dashboard = LedgerService::new(&state).dashboard(&user_id).await?;
    Ok(Json(dashboard))
}
