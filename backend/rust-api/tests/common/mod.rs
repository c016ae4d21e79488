#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use trivia_quiz_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{Difficulty, Question},
    services::{AppState, Stores},
    stores::memory::{InMemoryProgressLedger, InMemoryQuestionStore, InMemoryScoreLedger},
};

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub questions: Arc<InMemoryQuestionStore>,
    pub progress: Arc<InMemoryProgressLedger>,
    pub scores: Arc<InMemoryScoreLedger>,
}

pub fn test_config() -> Config {
    let mut config = Config::local();
    config.jwt_secret = "integration-test-secret".to_string();
    config.quiz.countdown_seconds = 2;
    config.quiz.tick_interval_ms = 5;
    config.quiz.flush_attempts = 2;
    config
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// App wired to in-memory stores; `customize` may swap individual collaborators.
pub fn create_test_app_with(customize: impl FnOnce(&mut Stores)) -> TestApp {
    create_test_app_with_config(test_config(), customize)
}

pub fn create_test_app_with_config(
    config: Config,
    customize: impl FnOnce(&mut Stores),
) -> TestApp {
    init_tracing();

    let questions = Arc::new(InMemoryQuestionStore::new());
    let progress = Arc::new(InMemoryProgressLedger::new());
    let scores = Arc::new(InMemoryScoreLedger::new());

    let mut stores = Stores {
        questions: questions.clone(),
        progress: progress.clone(),
        scores: scores.clone(),
        ..Stores::in_memory()
    };
    customize(&mut stores);

    let state = Arc::new(AppState::with_stores(config, stores));
    TestApp {
        router: create_router(state.clone()),
        state,
        questions,
        progress,
        scores,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(|_| {})
}

pub fn question(id: &str, category: &str, correct_answer: i32) -> Question {
    Question {
        id: id.to_string(),
        text: format!("Question {}", id),
        description: None,
        options: vec![
            "Alpha".to_string(),
            "Beta".to_string(),
            "Gamma".to_string(),
            "Delta".to_string(),
        ],
        correct_answer,
        category: category.to_string(),
        difficulty: Difficulty::Easy,
        created_by: None,
        created_at: Utc::now(),
    }
}

pub fn token_for(user_id: &str) -> String {
    JwtService::new(&test_config().jwt_secret)
        .generate_token(&JwtClaims::new(user_id, 3600))
        .unwrap()
}

impl TestApp {
    pub fn seed(&self, questions: Vec<Question>) {
        self.questions.seed(questions).unwrap();
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("authorization", format!("Bearer {}", token_for(user)));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> (StatusCode, Value) {
        self.request("GET", uri, user, None).await
    }

    pub async fn post(&self, uri: &str, user: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, user, Some(body)).await
    }

    /// Polls the score ledger until `count` events exist or the deadline passes.
    pub async fn wait_for_scores(&self, user_id: &str, count: usize) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let found = self
                .scores
                .events()
                .unwrap()
                .iter()
                .filter(|e| e.user_id == user_id)
                .count();
            if found >= count || tokio::time::Instant::now() >= deadline {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_progress(&self, user_id: &str, count: usize) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let found = self.progress.records_for(user_id).unwrap().len();
            if found >= count || tokio::time::Instant::now() >= deadline {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
