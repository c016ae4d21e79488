use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;

/// Latest known correctness of one user's answer to one question.
/// Keyed by `(user_id, question_id)`; every write overwrites `is_correct`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    pub user_id: String,
    pub question_id: String,
    pub category: String,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a progress upsert batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub question_id: String,
    pub is_correct: bool,
    pub category: String,
}

/// Append-only record of a finished session's score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreEvent {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressStats {
    pub attempted: u64,
    pub correct: u64,
    pub wrong: u64,
    pub accuracy_percent: f64,
}

impl ProgressStats {
    pub fn new(attempted: u64, correct: u64) -> Self {
        let accuracy_percent = if attempted > 0 {
            ((correct as f64 / attempted as f64) * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            attempted,
            correct,
            wrong: attempted.saturating_sub(correct),
            accuracy_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryBest {
    pub category: String,
    pub best_score: i32,
}

#[derive(Debug, Deserialize)]
pub struct AnswerOutcomeInput {
    #[serde(alias = "questionId")]
    pub question_id: String,
    #[serde(alias = "isCorrect")]
    pub is_correct: bool,
}

/// POST /api/v1/user/progress body.
#[derive(Debug, Deserialize, Validate)]
pub struct ProgressFlushRequest {
    #[validate(
        required(message = "category is required"),
        length(min = 1, message = "category must not be empty")
    )]
    pub category: Option<String>,
    pub answers: Vec<AnswerOutcomeInput>,
}

impl ProgressFlushRequest {
    pub fn into_updates(self) -> Result<Vec<ProgressUpdate>, ApiError> {
        self.validate()?;
        let category = self.category.unwrap_or_default().trim().to_string();
        if category.is_empty() {
            return Err(ApiError::field("category", "category must not be blank"));
        }

        if self
            .answers
            .iter()
            .any(|answer| answer.question_id.trim().is_empty())
        {
            return Err(ApiError::field("answers", "question_id must not be empty"));
        }

        Ok(self
            .answers
            .into_iter()
            .map(|answer| ProgressUpdate {
                question_id: answer.question_id,
                is_correct: answer.is_correct,
                category: category.clone(),
            })
            .collect())
    }
}

/// POST /api/v1/user/score body.
#[derive(Debug, Deserialize, Validate)]
pub struct ScoreFlushRequest {
    #[validate(
        required(message = "category is required"),
        length(min = 1, message = "category must not be empty")
    )]
    pub category: Option<String>,
    #[validate(required(message = "score is required"))]
    pub score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    /// Score history, best first.
    pub results: Vec<ScoreEvent>,
    pub best_scores: Vec<CategoryBest>,
    pub progress: ProgressStats,
    pub question_bank: Vec<CategoryCount>,
    pub total_questions: u64,
}
