use std::sync::Arc;

use crate::config::Config;
use crate::stores::{
    memory::{
        InMemoryProgressLedger, InMemoryQuestionStore, InMemoryScoreLedger, InMemorySessionStore,
    },
    mongo::{self, MongoProgressLedger, MongoQuestionStore, MongoScoreLedger},
    redis_store::RedisSessionStore,
    ProgressLedger, QuestionStore, ScoreLedger, SessionStore,
};
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

pub mod flush;
pub mod ledger_service;
pub mod question_service;
pub mod selector;
pub mod session_machine;
pub mod session_service;

use session_service::SessionLocks;

/// One handle per collaborator store.
#[derive(Clone)]
pub struct Stores {
    pub questions: Arc<dyn QuestionStore>,
    pub progress: Arc<dyn ProgressLedger>,
    pub scores: Arc<dyn ScoreLedger>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            questions: Arc::new(InMemoryQuestionStore::new()),
            progress: Arc::new(InMemoryProgressLedger::new()),
            scores: Arc::new(InMemoryScoreLedger::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
        }
    }
}

/// Process-wide registry, built once at startup.
pub struct AppState {
    pub config: Config,
    pub questions: Arc<dyn QuestionStore>,
    pub progress: Arc<dyn ProgressLedger>,
    pub scores: Arc<dyn ScoreLedger>,
    pub sessions: Arc<dyn SessionStore>,
    pub session_locks: Arc<SessionLocks>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let db = mongo_client.database(&config.mongo_database);
        mongo::ensure_indexes(&db).await?;

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let session_ttl = config.quiz.session_ttl_seconds;
        let stores = Stores {
            questions: Arc::new(MongoQuestionStore::new(db.clone())),
            progress: Arc::new(MongoProgressLedger::new(db.clone())),
            scores: Arc::new(MongoScoreLedger::new(db)),
            sessions: Arc::new(RedisSessionStore::new(redis, session_ttl)),
        };

        Ok(Self::with_stores(config, stores))
    }

    pub fn with_stores(config: Config, stores: Stores) -> Self {
        Self {
            config,
            questions: stores.questions,
            progress: stores.progress,
            scores: stores.scores,
            sessions: stores.sessions,
            session_locks: Arc::new(SessionLocks::default()),
        }
    }

    /// State backed entirely by in-process stores.
    pub fn in_memory(config: Config) -> Self {
        Self::with_stores(config, Stores::in_memory())
    }
}
