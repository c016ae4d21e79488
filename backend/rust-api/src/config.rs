use serde::Deserialize;
use std::env;

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub metrics_auth: String,
    pub quiz: QuizSettings,
}

/// Gameplay and persistence tuning for quiz sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizSettings {
    /// Upper bound on questions per session batch.
    pub batch_size: usize,
    /// Countdown budget per question (and per bonus replenishment).
    pub countdown_seconds: u32,
    /// Interval between server-driven countdown ticks on the SSE stream.
    pub tick_interval_ms: u64,
    pub session_ttl_seconds: u64,
    /// Attempts per ledger write before a flush is given up and logged.
    pub flush_attempts: usize,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            countdown_seconds: 30,
            tick_interval_ms: 1000,
            session_ttl_seconds: 3600,
            flush_attempts: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{env}.toml first, then APP__SECTION__KEY overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let lookup = |key: &str, fallback_env: &str| -> Option<String> {
            settings
                .get_string(key)
                .ok()
                .or_else(|| env::var(fallback_env).ok())
        };

        let mongo_uri = lookup("database.mongo_uri", "MONGO_URI")
            .unwrap_or_else(|| "mongodb://localhost:27017".to_string());

        let mongo_database =
            lookup("database.mongo_database", "MONGO_DATABASE").unwrap_or_else(|| "trivia".to_string());

        let redis_uri =
            lookup("redis.uri", "REDIS_URI").unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string());

        let jwt_secret = match lookup("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            None => {
                tracing::warn!("Using default JWT secret (dev mode only!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bind_addr =
            lookup("server.bind_addr", "BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string());

        let metrics_auth =
            lookup("metrics.auth", "METRICS_AUTH").unwrap_or_else(|| "admin:changeme".to_string());

        let defaults = QuizSettings::default();
        let quiz = QuizSettings {
            batch_size: positive_or(
                lookup("quiz.batch_size", "QUIZ_BATCH_SIZE"),
                defaults.batch_size,
            ),
            countdown_seconds: positive_or(
                lookup("quiz.countdown_seconds", "QUIZ_COUNTDOWN_SECONDS"),
                defaults.countdown_seconds,
            ),
            tick_interval_ms: positive_or(
                lookup("quiz.tick_interval_ms", "QUIZ_TICK_INTERVAL_MS"),
                defaults.tick_interval_ms,
            ),
            session_ttl_seconds: positive_or(
                lookup("quiz.session_ttl_seconds", "QUIZ_SESSION_TTL_SECONDS"),
                defaults.session_ttl_seconds,
            ),
            flush_attempts: positive_or(
                lookup("quiz.flush_attempts", "QUIZ_FLUSH_ATTEMPTS"),
                defaults.flush_attempts,
            ),
        };

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            metrics_auth,
            quiz,
        })
    }

    /// Configuration for running without backing services (tests, local demos).
    pub fn local() -> Self {
        Config {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "trivia".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            bind_addr: "127.0.0.1:8081".to_string(),
            metrics_auth: "admin:changeme".to_string(),
            quiz: QuizSettings::default(),
        }
    }
}

fn positive_or<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn positive_or_rejects_zero_and_garbage() {
        assert_eq!(positive_or(Some("0".to_string()), 30u32), 30);
        assert_eq!(positive_or(Some("abc".to_string()), 30u32), 30);
        assert_eq!(positive_or(None, 20usize), 20);
        assert_eq!(positive_or(Some(" 45 ".to_string()), 30u32), 45);
    }

    #[test]
    #[serial]
    fn load_reads_quiz_overrides_from_env() {
        env::set_var("QUIZ_COUNTDOWN_SECONDS", "12");
        env::set_var("QUIZ_BATCH_SIZE", "5");
        let config = Config::load().unwrap();
        assert_eq!(config.quiz.countdown_seconds, 12);
        assert_eq!(config.quiz.batch_size, 5);
        assert_eq!(config.quiz.tick_interval_ms, 1000);
        env::remove_var("QUIZ_COUNTDOWN_SECONDS");
        env::remove_var("QUIZ_BATCH_SIZE");
    }

    #[test]
    #[serial]
    fn load_requires_secret_in_prod() {
        env::set_var("APP_ENV", "prod");
        env::remove_var("JWT_SECRET");
        let result = Config::load();
        env::remove_var("APP_ENV");
        assert!(result.is_err());
    }
}
