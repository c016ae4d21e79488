use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{CreateQuestionRequest, Question};
use crate::services::{selector::QuestionSelector, AppState};
use crate::stores::QuestionStore;

/// Newest authored questions returned to their creator.
pub const MY_QUESTIONS_LIMIT: usize = 50;

pub struct QuestionService {
    questions: Arc<dyn QuestionStore>,
    selector: QuestionSelector,
}

impl QuestionService {
    pub fn new(state: &AppState) -> Self {
        Self {
            questions: state.questions.clone(),
            selector: QuestionSelector::new(
                state.questions.clone(),
                state.progress.clone(),
                state.config.quiz.batch_size,
            ),
        }
    }

    /// Validates and persists an authored question.
    pub async fn create(
        &self,
        author: &str,
        request: CreateQuestionRequest,
    ) -> Result<Question, ApiError> {
        let draft = request.into_draft(Some(author.to_string()))?;
        let question = self.questions.create(draft).await?;

        tracing::info!(
            "Question {} created by {} in {}",
            question.id,
            author,
            question.category
        );
        Ok(question)
    }

    pub async fn list_mine(&self, author: &str) -> Result<Vec<Question>, ApiError> {
        Ok(self
            .questions
            .list_by_creator(author, MY_QUESTIONS_LIMIT)
            .await?)
    }

    /// Question batch for clients that run the session themselves.
    pub async fn batch(
        &self,
        caller: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<Question>, ApiError> {
        self.selector
            .select(category, caller)
            .await
            .map_err(ApiError::Fetch)
    }
}
