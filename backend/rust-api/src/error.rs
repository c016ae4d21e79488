use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::session_machine::SessionError;

/// Failures of the backing document store, session cache or ledgers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bson decode error: {0}")]
    Bson(#[from] mongodb::bson::de::Error),
    #[error("{failed} of {total} progress upserts failed")]
    PartialBatch { failed: usize, total: usize },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Field name -> violated constraints, as returned to authoring clients.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Error taxonomy surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Conflict(#[from] SessionError),
    #[error("question batch unavailable: {0}")]
    Fetch(StoreError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(fields)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .map(|(field, violations)| {
                let messages = violations
                    .iter()
                    .map(|violation| {
                        violation
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| violation.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        ApiError::Validation(fields)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation_failed", "fields": fields }),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "unauthorized", "message": self.to_string() }),
            ),
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": self.to_string() }),
            ),
            ApiError::Conflict(_) => (
                StatusCode::CONFLICT,
                json!({ "error": "invalid_transition", "message": self.to_string() }),
            ),
            ApiError::Fetch(e) => {
                tracing::error!("Question fetch failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "fetch_failed", "message": "Failed to fetch questions" }),
                )
            }
            ApiError::Persistence(e) => {
                tracing::error!("Persistence failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal", "message": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
