//! In-process stores used by tests and by local runs without MongoDB/Redis.

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{ProgressLedger, QuestionStore, ScoreLedger, SessionStore};
use crate::error::StoreError;
use crate::models::{
    CategoryBest, CategoryCount, ProgressRecord, ProgressStats, ProgressUpdate, Question,
    QuestionDraft, QuestionFilter, ScoreEvent,
};
use crate::services::session_machine::QuizSession;

fn guard<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

#[derive(Default)]
pub struct InMemoryQuestionStore {
    questions: Mutex<Vec<Question>>,
}

impl InMemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts ready-made questions as-is (ids included).
    pub fn seed(&self, questions: impl IntoIterator<Item = Question>) -> Result<(), StoreError> {
        guard(&self.questions)?.extend(questions);
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn create(&self, draft: QuestionDraft) -> Result<Question, StoreError> {
        let question = Question {
            id: ObjectId::new().to_hex(),
            text: draft.text,
            description: draft.description,
            options: draft.options,
            correct_answer: draft.correct_answer,
            category: draft.category,
            difficulty: draft.difficulty,
            created_by: draft.created_by,
            created_at: Utc::now(),
        };
        guard(&self.questions)?.push(question.clone());
        Ok(question)
    }

    async fn sample(
        &self,
        filter: &QuestionFilter,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError> {
        let questions = guard(&self.questions)?;
        let eligible: Vec<&Question> = questions.iter().filter(|q| filter.matches(q)).collect();
        let mut rng = rand::rng();
        Ok(eligible
            .choose_multiple(&mut rng, limit)
            .map(|q| (*q).clone())
            .collect())
    }

    async fn list_by_creator(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError> {
        let questions = guard(&self.questions)?;
        Ok(questions
            .iter()
            .rev()
            .filter(|q| q.created_by.as_deref() == Some(user_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_by_category(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let questions = guard(&self.questions)?;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for question in questions.iter() {
            *counts.entry(question.category.as_str()).or_default() += 1;
        }
        let mut counts: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(counts)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        guard(&self.questions).map(|_| ())
    }
}

#[derive(Default)]
pub struct InMemoryProgressLedger {
    records: Mutex<HashMap<(String, String), ProgressRecord>>,
}

impl InMemoryProgressLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_for(&self, user_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let records = guard(&self.records)?;
        let mut found: Vec<ProgressRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(found)
    }
}

#[async_trait]
impl ProgressLedger for InMemoryProgressLedger {
    async fn upsert_batch(
        &self,
        user_id: &str,
        updates: &[ProgressUpdate],
    ) -> Result<(), StoreError> {
        let mut records = guard(&self.records)?;
        let now = Utc::now();
        for update in updates {
            let key = (user_id.to_string(), update.question_id.clone());
            records
                .entry(key)
                .and_modify(|record| {
                    record.is_correct = update.is_correct;
                    record.category = update.category.clone();
                    record.updated_at = now;
                })
                .or_insert_with(|| ProgressRecord {
                    user_id: user_id.to_string(),
                    question_id: update.question_id.clone(),
                    category: update.category.clone(),
                    is_correct: update.is_correct,
                    created_at: now,
                    updated_at: now,
                });
        }
        Ok(())
    }

    async fn solved_question_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let records = guard(&self.records)?;
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id && r.is_correct)
            .map(|r| r.question_id.clone())
            .collect())
    }

    async fn get(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let records = guard(&self.records)?;
        Ok(records
            .get(&(user_id.to_string(), question_id.to_string()))
            .cloned())
    }

    async fn stats(&self, user_id: &str) -> Result<ProgressStats, StoreError> {
        let records = guard(&self.records)?;
        let (attempted, correct) = records
            .values()
            .filter(|r| r.user_id == user_id)
            .fold((0u64, 0u64), |(attempted, correct), r| {
                (attempted + 1, correct + u64::from(r.is_correct))
            });
        Ok(ProgressStats::new(attempted, correct))
    }
}

#[derive(Default)]
pub struct InMemoryScoreLedger {
    events: Mutex<Vec<ScoreEvent>>,
}

impl InMemoryScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event in insertion order.
    pub fn events(&self) -> Result<Vec<ScoreEvent>, StoreError> {
        Ok(guard(&self.events)?.clone())
    }
}

#[async_trait]
impl ScoreLedger for InMemoryScoreLedger {
    async fn append(
        &self,
        user_id: &str,
        category: &str,
        score: i32,
    ) -> Result<ScoreEvent, StoreError> {
        let event = ScoreEvent {
            id: ObjectId::new().to_hex(),
            user_id: user_id.to_string(),
            category: category.to_string(),
            score,
            created_at: Utc::now(),
        };
        guard(&self.events)?.push(event.clone());
        Ok(event)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ScoreEvent>, StoreError> {
        let events = guard(&self.events)?;
        let mut found: Vec<ScoreEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(found)
    }

    async fn best_by_category(&self, user_id: &str) -> Result<Vec<CategoryBest>, StoreError> {
        let events = guard(&self.events)?;
        let mut best: HashMap<&str, i32> = HashMap::new();
        for event in events.iter().filter(|e| e.user_id == user_id) {
            best.entry(event.category.as_str())
                .and_modify(|score| *score = (*score).max(event.score))
                .or_insert(event.score);
        }
        let mut best: Vec<CategoryBest> = best
            .into_iter()
            .map(|(category, best_score)| CategoryBest {
                category: category.to_string(),
                best_score,
            })
            .collect();
        best.sort_by(|a, b| {
            b.best_score
                .cmp(&a.best_score)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(best)
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, QuizSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<QuizSession>, StoreError> {
        Ok(guard(&self.sessions)?.get(session_id).cloned())
    }

    async fn save(&self, session: &QuizSession) -> Result<(), StoreError> {
        guard(&self.sessions)?.insert(session.id().to_string(), session.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        guard(&self.sessions).map(|_| ())
    }
}
