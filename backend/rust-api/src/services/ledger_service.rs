use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{
    ledger::{ProgressFlushRequest, ScoreFlushRequest},
    DashboardResponse, ScoreEvent,
};
use crate::services::AppState;
use crate::stores::{ProgressLedger, QuestionStore, ScoreLedger};
use validator::Validate;

/// Synchronous ledger endpoints used by clients that flush their own sessions.
pub struct LedgerService {
    questions: Arc<dyn QuestionStore>,
    progress: Arc<dyn ProgressLedger>,
    scores: Arc<dyn ScoreLedger>,
}

impl LedgerService {
    pub fn new(state: &AppState) -> Self {
        Self {
            questions: state.questions.clone(),
            progress: state.progress.clone(),
            scores: state.scores.clone(),
        }
    }

    /// Returns the number of entries written. An empty batch writes nothing.
    pub async fn record_progress(
        &self,
        user_id: &str,
        request: ProgressFlushRequest,
    ) -> Result<usize, ApiError> {
        let updates = request.into_updates()?;
        if updates.is_empty() {
            return Ok(0);
        }

        self.progress.upsert_batch(user_id, &updates).await?;
        tracing::info!("Progress saved for user {} ({} answers)", user_id, updates.len());
        Ok(updates.len())
    }

    pub async fn record_score(
        &self,
        user_id: &str,
        request: ScoreFlushRequest,
    ) -> Result<ScoreEvent, ApiError> {
        request.validate()?;
        let (Some(category), Some(score)) = (request.category, request.score) else {
            return Err(ApiError::field("body", "category and score are required"));
        };
        if category.trim().is_empty() {
            return Err(ApiError::field("category", "category must not be blank"));
        }

        let event = self.scores.append(user_id, category.trim(), score).await?;
        tracing::info!("Score {} saved for user {} in {}", score, user_id, event.category);
        Ok(event)
    }

    pub async fn dashboard(&self, user_id: &str) -> Result<DashboardResponse, ApiError> {
        let results = self.scores.list_by_user(user_id).await?;
        let best_scores = self.scores.best_by_category(user_id).await?;
        let progress = self.progress.stats(user_id).await?;
        let question_bank = self.questions.count_by_category().await?;
        let total_questions = question_bank.iter().map(|c| c.count).sum();

        Ok(DashboardResponse {
            results,
            best_scores,
            progress,
            question_bank,
            total_questions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn service() -> LedgerService {
        LedgerService::new(&AppState::in_memory(Config::local()))
    }

    #[tokio::test]
    async fn dashboard_aggregates_scores_and_progress() {
        let service = service();
        for (category, score) in [("Science", 9), ("Science", 20), ("History", 5)] {
            let request: ScoreFlushRequest =
                serde_json::from_value(json!({ "category": category, "score": score })).unwrap();
            service.record_score("u1", request).await.unwrap();
        }

        let progress: ProgressFlushRequest = serde_json::from_value(json!({
            "category": "Science",
            "answers": [
                { "questionId": "q1", "isCorrect": true },
                { "questionId": "q2", "isCorrect": false },
                { "questionId": "q3", "isCorrect": true }
            ]
        }))
        .unwrap();
        assert_eq!(service.record_progress("u1", progress).await.unwrap(), 3);

        let dashboard = service.dashboard("u1").await.unwrap();
        let scores: Vec<i32> = dashboard.results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![20, 9, 5]);
        assert_eq!(dashboard.best_scores[0].category, "Science");
        assert_eq!(dashboard.best_scores[0].best_score, 20);
        assert_eq!(dashboard.progress.attempted, 3);
        assert_eq!(dashboard.progress.correct, 2);
        assert_eq!(dashboard.total_questions, 0);
    }

    #[tokio::test]
    async fn empty_progress_batch_is_a_no_op() {
        let request: ProgressFlushRequest =
            serde_json::from_value(json!({ "category": "Art", "answers": [] })).unwrap();
        assert_eq!(service().record_progress("u1", request).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn score_without_value_is_rejected() {
        let request: ScoreFlushRequest =
            serde_json::from_value(json!({ "category": "Art" })).unwrap();
        assert!(matches!(
            service().record_score("u1", request).await,
            Err(ApiError::Validation(_))
        ));
    }
}
