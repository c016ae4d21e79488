use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::{AppJson, AuthUser, Caller},
    models::CreateQuestionRequest,
    services::{question_service::QuestionService, AppState},
};

#[derive(Debug, Default, Deserialize)]
pub struct QuestionQuery {
    pub category: Option<String>,
}

/// GET /api/v1/questions?category=
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<QuestionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let questions = QuestionService::new(&state)
        .batch(caller.id(), query.category.as_deref())
        .await?;
    Ok(Json(questions))
}

/// POST /api/v1/questions
pub async fn create_question(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    AppJson(req): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = QuestionService::new(&state).create(&user_id, req).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// GET /api/v1/user/questions
pub async fn list_my_questions(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let questions = QuestionService::new(&state).list_mine(&user_id).await?;
    Ok(Json(questions))
}
