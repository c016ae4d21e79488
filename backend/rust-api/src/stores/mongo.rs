//! MongoDB-backed question store and ledgers.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{ProgressLedger, QuestionStore, ScoreLedger};
use crate::error::StoreError;
use crate::metrics::track_db_operation;
use crate::models::{
    CategoryBest, CategoryCount, Difficulty, ProgressRecord, ProgressStats, ProgressUpdate,
    Question, QuestionDraft, QuestionFilter, ScoreEvent,
};
use crate::utils::time::{bson_to_chrono, chrono_to_bson};

pub const QUESTIONS: &str = "questions";
pub const USER_PROGRESS: &str = "user_progress";
pub const RESULTS: &str = "results";

#[derive(Debug, Serialize, Deserialize)]
struct QuestionDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    options: Vec<String>,
    correct_answer: i32,
    category: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
    created_at: BsonDateTime,
}

impl From<QuestionDocument> for Question {
    fn from(doc: QuestionDocument) -> Self {
        Question {
            id: doc.id.to_hex(),
            text: doc.text,
            description: doc.description,
            options: doc.options,
            correct_answer: doc.correct_answer,
            category: doc.category,
            difficulty: doc.difficulty,
            created_by: doc.created_by,
            created_at: bson_to_chrono(doc.created_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProgressDocument {
    user_id: String,
    question_id: String,
    category: String,
    is_correct: bool,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<ProgressDocument> for ProgressRecord {
    fn from(doc: ProgressDocument) -> Self {
        ProgressRecord {
            user_id: doc.user_id,
            question_id: doc.question_id,
            category: doc.category,
            is_correct: doc.is_correct,
            created_at: bson_to_chrono(doc.created_at),
            updated_at: bson_to_chrono(doc.updated_at),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    user_id: String,
    category: String,
    score: i32,
    created_at: BsonDateTime,
}

impl From<ResultDocument> for ScoreEvent {
    fn from(doc: ResultDocument) -> Self {
        ScoreEvent {
            id: doc.id.to_hex(),
            user_id: doc.user_id,
            category: doc.category,
            score: doc.score,
            created_at: bson_to_chrono(doc.created_at),
        }
    }
}

/// Creates the indexes every collection relies on. Safe to run on every start.
pub async fn ensure_indexes(db: &Database) -> Result<(), StoreError> {
    db.collection::<Document>(QUESTIONS)
        .create_index(IndexModel::builder().keys(doc! { "category": 1 }).build())
        .await?;
    db.collection::<Document>(QUESTIONS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "created_by": 1, "created_at": -1 })
                .build(),
        )
        .await?;
    db.collection::<Document>(USER_PROGRESS)
        .create_index(
            IndexModel::builder()
                .keys(doc! { "user_id": 1, "question_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await?;
    db.collection::<Document>(RESULTS)
        .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
        .await?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

fn category_filter(category: &str) -> Document {
    doc! {
        "category": {
            "$regex": format!("^{}$", regex::escape(category)),
            "$options": "i",
        }
    }
}

fn read_u64(doc: &Document, key: &str) -> u64 {
    doc.get_i64(key)
        .or_else(|_| doc.get_i32(key).map(i64::from))
        .map(|v| v.max(0) as u64)
        .unwrap_or(0)
}

pub struct MongoQuestionStore {
    db: Database,
}

impl MongoQuestionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> Collection<QuestionDocument> {
        self.db.collection(QUESTIONS)
    }
}

#[async_trait]
impl QuestionStore for MongoQuestionStore {
    async fn create(&self, draft: QuestionDraft) -> Result<Question, StoreError> {
        let document = QuestionDocument {
            id: ObjectId::new(),
            text: draft.text,
            description: draft.description,
            options: draft.options,
            correct_answer: draft.correct_answer,
            category: draft.category,
            difficulty: draft.difficulty,
            created_by: draft.created_by,
            created_at: chrono_to_bson(Utc::now()),
        };

        track_db_operation("insert_one", QUESTIONS, async {
            self.collection().insert_one(&document).await
        })
        .await?;

        tracing::info!("Question created: {}", document.id.to_hex());
        Ok(document.into())
    }

    async fn sample(
        &self,
        filter: &QuestionFilter,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError> {
        let mut matcher = match filter.category.as_deref() {
            Some(category) => category_filter(category),
            None => Document::new(),
        };
        if !filter.exclude.is_empty() {
            let excluded: Vec<Bson> = filter
                .exclude
                .iter()
                .filter_map(|id| ObjectId::parse_str(id).ok())
                .map(Bson::ObjectId)
                .collect();
            matcher.insert("_id", doc! { "$nin": excluded });
        }

        let pipeline = vec![
            doc! { "$match": matcher },
            doc! { "$sample": { "size": limit as i64 } },
        ];

        let documents: Vec<Document> = track_db_operation("aggregate", QUESTIONS, async {
            let cursor = self.collection().aggregate(pipeline).await?;
            cursor.try_collect().await
        })
        .await?;

        // $sample may repeat documents on large collections
        let mut seen = HashSet::new();
        let mut questions = Vec::with_capacity(documents.len());
        for document in documents {
            let decoded: QuestionDocument = mongodb::bson::from_document(document)?;
            let question = Question::from(decoded);
            if seen.insert(question.id.clone()) {
                questions.push(question);
            }
        }
        Ok(questions)
    }

    async fn list_by_creator(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Question>, StoreError> {
        let documents: Vec<QuestionDocument> = track_db_operation("find", QUESTIONS, async {
            let cursor = self
                .collection()
                .find(doc! { "created_by": user_id })
                .sort(doc! { "created_at": -1 })
                .limit(limit as i64)
                .await?;
            cursor.try_collect().await
        })
        .await?;

        Ok(documents.into_iter().map(Question::from).collect())
    }

    async fn count_by_category(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let pipeline = vec![
            doc! { "$group": { "_id": "$category", "count": { "$sum": 1 } } },
            doc! { "$sort": { "count": -1, "_id": 1 } },
        ];

        let documents: Vec<Document> = track_db_operation("aggregate", QUESTIONS, async {
            let cursor = self.collection().aggregate(pipeline).await?;
            cursor.try_collect().await
        })
        .await?;

        Ok(documents
            .iter()
            .filter_map(|doc| {
                Some(CategoryCount {
                    category: doc.get_str("_id").ok()?.to_string(),
                    count: read_u64(doc, "count"),
                })
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

pub struct MongoProgressLedger {
    db: Database,
}

impl MongoProgressLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> Collection<ProgressDocument> {
        self.db.collection(USER_PROGRESS)
    }
}

#[async_trait]
impl ProgressLedger for MongoProgressLedger {
    async fn upsert_batch(
        &self,
        user_id: &str,
        updates: &[ProgressUpdate],
    ) -> Result<(), StoreError> {
        let mut failed = 0;

        for update in updates {
            let now = chrono_to_bson(Utc::now());
            let result = track_db_operation("update_one", USER_PROGRESS, async {
                self.collection()
                    .update_one(
                        doc! { "user_id": user_id, "question_id": &update.question_id },
                        doc! {
                            "$set": {
                                "is_correct": update.is_correct,
                                "category": &update.category,
                                "updated_at": now,
                            },
                            "$setOnInsert": { "created_at": now },
                        },
                    )
                    .upsert(true)
                    .await
            })
            .await;

            if let Err(e) = result {
                failed += 1;
                tracing::warn!(
                    "Progress upsert failed for user {} question {}: {}",
                    user_id,
                    update.question_id,
                    e
                );
            }
        }

        if failed > 0 {
            return Err(StoreError::PartialBatch {
                failed,
                total: updates.len(),
            });
        }
        Ok(())
    }

    async fn solved_question_ids(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let documents: Vec<ProgressDocument> = track_db_operation("find", USER_PROGRESS, async {
            let cursor = self
                .collection()
                .find(doc! { "user_id": user_id, "is_correct": true })
                .await?;
            cursor.try_collect().await
        })
        .await?;

        Ok(documents.into_iter().map(|doc| doc.question_id).collect())
    }

    async fn get(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let document = track_db_operation("find_one", USER_PROGRESS, async {
            self.collection()
                .find_one(doc! { "user_id": user_id, "question_id": question_id })
                .await
        })
        .await?;

        Ok(document.map(ProgressRecord::from))
    }

    async fn stats(&self, user_id: &str) -> Result<ProgressStats, StoreError> {
        let attempted = track_db_operation("count_documents", USER_PROGRESS, async {
            self.collection()
                .count_documents(doc! { "user_id": user_id })
                .await
        })
        .await?;
        let correct = track_db_operation("count_documents", USER_PROGRESS, async {
            self.collection()
                .count_documents(doc! { "user_id": user_id, "is_correct": true })
                .await
        })
        .await?;

        Ok(ProgressStats::new(attempted, correct))
    }
}

pub struct MongoScoreLedger {
    db: Database,
}

impl MongoScoreLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self) -> Collection<ResultDocument> {
        self.db.collection(RESULTS)
    }
}

#[async_trait]
impl ScoreLedger for MongoScoreLedger {
    async fn append(
        &self,
        user_id: &str,
        category: &str,
        score: i32,
    ) -> Result<ScoreEvent, StoreError> {
        let document = ResultDocument {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            category: category.to_string(),
            score,
            created_at: chrono_to_bson(Utc::now()),
        };

        track_db_operation("insert_one", RESULTS, async {
            self.collection().insert_one(&document).await
        })
        .await?;

        Ok(document.into())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ScoreEvent>, StoreError> {
        let documents: Vec<ResultDocument> = track_db_operation("find", RESULTS, async {
            let cursor = self
                .collection()
                .find(doc! { "user_id": user_id })
                .sort(doc! { "score": -1, "created_at": -1 })
                .await?;
            cursor.try_collect().await
        })
        .await?;

        Ok(documents.into_iter().map(ScoreEvent::from).collect())
    }

    async fn best_by_category(&self, user_id: &str) -> Result<Vec<CategoryBest>, StoreError> {
        let pipeline = vec![
            doc! { "$match": { "user_id": user_id } },
            doc! { "$group": { "_id": "$category", "best_score": { "$max": "$score" } } },
            doc! { "$sort": { "best_score": -1, "_id": 1 } },
        ];

        let documents: Vec<Document> = track_db_operation("aggregate", RESULTS, async {
            let cursor = self.collection().aggregate(pipeline).await?;
            cursor.try_collect().await
        })
        .await?;

        Ok(documents
            .iter()
            .filter_map(|doc| {
                Some(CategoryBest {
                    category: doc.get_str("_id").ok()?.to_string(),
                    best_score: doc.get_i32("best_score").ok()?,
                })
            })
            .collect())
    }
}
