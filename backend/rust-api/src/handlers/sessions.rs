use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::{AppJson, Caller},
    models::{SessionView, StartSessionRequest, SubmitAnswerRequest},
    services::{session_service::SessionService, AppState},
};

/// POST /api/v1/quiz/sessions
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    AppJson(req): AppJson<StartSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = SessionService::new(&state)
        .start(caller.id(), req.category.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(SessionView::from(&session))))
}

/// GET /api/v1/quiz/sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = SessionService::new(&state)
        .get(caller.id(), &session_id)
        .await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /api/v1/quiz/sessions/{id}/answers
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = SessionService::new(&state)
        .submit(caller.id(), &session_id, req.answer)
        .await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /api/v1/quiz/sessions/{id}/tick
pub async fn tick_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, _) = SessionService::new(&state)
        .tick(caller.id(), &session_id)
        .await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /api/v1/quiz/sessions/{id}/next
///
/// Completion dispatches the ledger flush and responds without waiting for it.
pub async fn next_question(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let advanced = SessionService::new(&state)
        .advance(caller.id(), &session_id)
        .await?;
    Ok(Json(SessionView::from(&advanced.session)))
}

/// POST /api/v1/quiz/sessions/{id}/restart
pub async fn restart_session(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = SessionService::new(&state)
        .restart(caller.id(), &session_id)
        .await?;
    Ok(Json(SessionView::from(&session)))
}
