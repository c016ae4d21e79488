use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::SessionStore;
use crate::error::StoreError;
use crate::metrics::track_cache_operation;
use crate::services::session_machine::QuizSession;

pub fn session_key(session_id: &str) -> String {
    format!("quiz_session:{}", session_id)
}

/// Quiz session snapshots stored as JSON with a sliding TTL.
pub struct RedisSessionStore {
    redis: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<QuizSession>, StoreError> {
        let mut conn = self.redis.clone();
        let key = session_key(session_id);

        let raw: Option<String> = track_cache_operation("get", async {
            redis::cmd("GET").arg(&key).query_async(&mut conn).await
        })
        .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &QuizSession) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let key = session_key(session.id());
        let json = serde_json::to_string(session)?;

        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&key)
                .arg(self.ttl_seconds)
                .arg(json)
                .query_async::<()>(&mut conn)
                .await
        })
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_keys_are_namespaced() {
        assert_eq!(session_key("abc"), "quiz_session:abc");
    }
}
