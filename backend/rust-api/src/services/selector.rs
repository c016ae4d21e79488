use std::collections::HashSet;
use std::sync::Arc;

use crate::error::StoreError;
use crate::metrics::QUESTIONS_SERVED_TOTAL;
use crate::models::{Question, QuestionFilter};
use crate::services::session_machine::ALL_CATEGORIES;
use crate::stores::{ProgressLedger, QuestionStore};

/// Trims the requested category; blank or `all` means "every category".
pub fn normalize_category(category: Option<&str>) -> Option<String> {
    category
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(ALL_CATEGORIES))
        .map(str::to_string)
}

/// Builds a session's question batch. Read-only.
#[derive(Clone)]
pub struct QuestionSelector {
    questions: Arc<dyn QuestionStore>,
    progress: Arc<dyn ProgressLedger>,
    batch_size: usize,
}

impl QuestionSelector {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        progress: Arc<dyn ProgressLedger>,
        batch_size: usize,
    ) -> Self {
        Self {
            questions,
            progress,
            batch_size,
        }
    }

    /// Random batch of at most `batch_size` questions. Identified callers never see
    /// questions whose latest recorded answer was correct. An empty batch means the
    /// category is unknown or exhausted.
    pub async fn select(
        &self,
        category: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<Question>, StoreError> {
        let exclude = match user_id {
            Some(user_id) => self.progress.solved_question_ids(user_id).await?,
            None => HashSet::new(),
        };

        let filter = QuestionFilter {
            category: normalize_category(category),
            exclude,
        };
        let batch = self.questions.sample(&filter, self.batch_size).await?;

        tracing::debug!(
            "Selected {} questions (category={:?}, excluded={})",
            batch.len(),
            filter.category,
            filter.exclude.len()
        );
        QUESTIONS_SERVED_TOTAL.inc_by(batch.len() as u64);

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, ProgressUpdate};
    use crate::stores::memory::{InMemoryProgressLedger, InMemoryQuestionStore};
    use chrono::Utc;

    fn question(id: &str, category: &str) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {}", id),
            description: None,
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: 0,
            category: category.to_string(),
            difficulty: Difficulty::Easy,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn ids(batch: &[Question]) -> HashSet<String> {
        batch.iter().map(|q| q.id.clone()).collect()
    }

    async fn fixture() -> (QuestionSelector, Arc<InMemoryProgressLedger>) {
        let questions = Arc::new(InMemoryQuestionStore::new());
        questions
            .seed([
                question("q1", "Science"),
                question("q2", "Science"),
                question("q3", "science"),
                question("h1", "History"),
            ])
            .unwrap();
        let progress = Arc::new(InMemoryProgressLedger::new());
        let selector = QuestionSelector::new(questions, progress.clone(), 20);
        (selector, progress)
    }

    async fn record(progress: &InMemoryProgressLedger, question_id: &str, is_correct: bool) {
        progress
            .upsert_batch(
                "u1",
                &[ProgressUpdate {
                    question_id: question_id.to_string(),
                    is_correct,
                    category: "Science".to_string(),
                }],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn solved_questions_are_excluded_for_that_user_only() {
        let (selector, progress) = fixture().await;
        record(&progress, "q1", true).await;
        record(&progress, "q2", false).await;

        let mine = selector.select(Some("Science"), Some("u1")).await.unwrap();
        assert_eq!(ids(&mine), HashSet::from(["q2".to_string(), "q3".to_string()]));

        let theirs = selector.select(Some("Science"), Some("u2")).await.unwrap();
        assert_eq!(theirs.len(), 3);

        let anonymous = selector.select(Some("SCIENCE"), None).await.unwrap();
        assert_eq!(anonymous.len(), 3);
    }

    #[tokio::test]
    async fn wrong_answer_after_correct_makes_question_eligible_again() {
        let (selector, progress) = fixture().await;
        record(&progress, "q1", true).await;
        record(&progress, "q1", false).await;

        let batch = selector.select(Some("science"), Some("u1")).await.unwrap();
        assert!(ids(&batch).contains("q1"));
    }

    #[tokio::test]
    async fn unknown_or_blank_category() {
        let (selector, _) = fixture().await;
        assert!(selector.select(Some("Geology"), None).await.unwrap().is_empty());
        assert!(selector.select(Some("Sci"), None).await.unwrap().is_empty());
        assert_eq!(selector.select(Some("  "), None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn all_selects_every_category() {
        let (selector, _) = fixture().await;
        assert_eq!(selector.select(Some("all"), None).await.unwrap().len(), 4);
        assert_eq!(selector.select(Some(" ALL "), None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn batch_is_capped() {
        let questions = Arc::new(InMemoryQuestionStore::new());
        questions
            .seed((0..30).map(|i| question(&format!("q{}", i), "Space")))
            .unwrap();
        let selector =
            QuestionSelector::new(questions, Arc::new(InMemoryProgressLedger::new()), 20);

        let batch = selector.select(Some("space"), None).await.unwrap();
        assert_eq!(ids(&batch).len(), 20);
    }

    #[test]
    fn category_normalization() {
        assert_eq!(normalize_category(Some(" Art ")), Some("Art".to_string()));
        assert_eq!(normalize_category(Some("")), None);
        assert_eq!(normalize_category(Some("All")), None);
        assert_eq!(normalize_category(Some("allergies")), Some("allergies".to_string()));
        assert_eq!(normalize_category(None), None);
    }
}
