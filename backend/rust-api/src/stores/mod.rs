//! Collaborator stores behind the quiz core.
//!
//! Each store is a trait object so the same services run against MongoDB/Redis in
//! production and against the in-memory implementations in tests and local runs.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::{
    CategoryBest, CategoryCount, ProgressRecord, ProgressStats, ProgressUpdate, Question,
    QuestionDraft, QuestionFilter, ScoreEvent,
};
use crate::services::session_machine::QuizSession;

pub mod memory;
pub mod mongo;
pub mod redis_store;

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Persists a validated draft and returns it with its generated id.
    async fn create(&self, draft: QuestionDraft) -> Result<Question, StoreError>;

    /// Uniform random sample without replacement of at most `limit` matching questions.
    async fn sample(
        &self,
        filter: &QuestionFilter,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError>;

    /// Newest first.
    async fn list_by_creator(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError>;

    /// Largest categories first.
    async fn count_by_category(&self) -> Result<Vec<CategoryCount>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProgressLedger: Send + Sync {
    /// Latest-write-wins upsert per `(user_id, question_id)`. Entries are applied
    /// independently; a failure of one entry does not roll back the others.
    async fn upsert_batch(&self, user_id: &str, updates: &[ProgressUpdate])
        -> Result<(), StoreError>;

    /// Ids of questions whose latest recorded answer was correct.
    async fn solved_question_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn get(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError>;

    async fn stats(&self, user_id: &str) -> Result<ProgressStats, StoreError>;
}

#[async_trait]
pub trait ScoreLedger: Send + Sync {
    /// Pure insert; events are never updated or deleted.
    async fn append(&self, user_id: &str, category: &str, score: i32)
        -> Result<ScoreEvent, StoreError>;

    /// Highest score first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ScoreEvent>, StoreError>;

    async fn best_by_category(&self, user_id: &str) -> Result<Vec<CategoryBest>, StoreError>;
}

/// Snapshot storage for transient quiz sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<QuizSession>, StoreError>;

    async fn save(&self, session: &QuizSession) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
