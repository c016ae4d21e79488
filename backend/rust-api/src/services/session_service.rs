use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::ApiError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, BONUS_GRANTS_TOTAL, QUIZ_SESSIONS_ACTIVE, QUIZ_SESSIONS_TOTAL,
};
use crate::models::Question;
use crate::services::{
    flush::{FlushDispatcher, FlushHandle},
    selector::{normalize_category, QuestionSelector},
    session_machine::{Advance, Evaluation, LoadFailure, QuizSession, SessionPhase, Tick},
    AppState,
};
use crate::stores::SessionStore;
use crate::utils::retry::RetryConfig;

/// Per-session write locks so every mutation is load, transition, save by a single writer.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of `next()`: the saved session plus, on completion, the detached flush.
pub struct Advanced {
    pub session: QuizSession,
    pub flush: Option<FlushHandle>,
}

fn in_play(phase: SessionPhase) -> bool {
    matches!(phase, SessionPhase::InProgress | SessionPhase::AnswerRevealed)
}

fn record_evaluation(evaluation: &Evaluation) {
    let outcome = if evaluation.timed_out {
        "timeout"
    } else if evaluation.is_correct {
        "correct"
    } else {
        "wrong"
    };
    ANSWERS_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
}

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    selector: QuestionSelector,
    flusher: FlushDispatcher,
    countdown_seconds: u32,
    tick_interval: TimeDelta,
}

impl SessionService {
    pub fn new(state: &AppState) -> Self {
        let quiz = &state.config.quiz;
        Self {
            sessions: state.sessions.clone(),
            locks: state.session_locks.clone(),
            selector: QuestionSelector::new(
                state.questions.clone(),
                state.progress.clone(),
                quiz.batch_size,
            ),
            flusher: FlushDispatcher::new(
                state.progress.clone(),
                state.scores.clone(),
                RetryConfig::for_flush(quiz.flush_attempts),
            ),
            countdown_seconds: quiz.countdown_seconds,
            tick_interval: TimeDelta::from_std(Duration::from_millis(quiz.tick_interval_ms))
                .unwrap_or(TimeDelta::MAX),
        }
    }

    /// Creates a session and runs its initial fetch: `InProgress(0)` or `Failed`.
    pub async fn start(
        &self,
        caller: Option<&str>,
        category: Option<&str>,
    ) -> Result<QuizSession, ApiError> {
        let mut session = QuizSession::new(
            caller.map(str::to_string),
            normalize_category(category),
            self.countdown_seconds,
        );

        let batch = self.fetch_batch(&session).await;
        session.load(batch)?;
        self.sessions.save(&session).await?;

        QUIZ_SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        self.record_load(&session);

        tracing::info!(
            "Quiz session {} started for {} ({} questions, phase {})",
            session.id(),
            caller.unwrap_or("anonymous"),
            session.total_questions(),
            session.phase()
        );
        Ok(session)
    }

    pub async fn get(&self, caller: Option<&str>, session_id: &str) -> Result<QuizSession, ApiError> {
        self.load_owned(caller, session_id).await
    }

    pub async fn submit(
        &self,
        caller: Option<&str>,
        session_id: &str,
        answer: i32,
    ) -> Result<QuizSession, ApiError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_owned(caller, session_id).await?;

        match session.submit(answer)? {
            Some(evaluation) => {
                record_evaluation(&evaluation);
                self.sessions.save(&session).await?;
                tracing::info!(
                    "Session {} question {} answered {} (correct={}, score={})",
                    session_id,
                    evaluation.question_index,
                    evaluation.selected,
                    evaluation.is_correct,
                    session.score()
                );
            }
            None => {
                tracing::debug!(
                    "Ignoring repeated answer for session {} question {}",
                    session_id,
                    session.question_index()
                );
            }
        }

        Ok(session)
    }

    /// One countdown unit. Ticks outside an answerable question, or arriving within
    /// `tick_interval_ms` of the last consumed unit, change nothing.
    pub async fn tick(
        &self,
        caller: Option<&str>,
        session_id: &str,
    ) -> Result<(QuizSession, Tick), ApiError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_owned(caller, session_id).await?;

        let tick = session.tick_at(Utc::now(), self.tick_interval);
        match tick {
            Tick::Idle => return Ok((session, tick)),
            Tick::Counting { .. } => {}
            Tick::BonusGranted { remaining } => {
                BONUS_GRANTS_TOTAL.inc();
                tracing::info!(
                    "Session {} question {}: bonus time granted ({}s)",
                    session_id,
                    session.question_index(),
                    remaining
                );
            }
            Tick::TimedOut(evaluation) => {
                record_evaluation(&evaluation);
                tracing::info!(
                    "Session {} question {} timed out (score={})",
                    session_id,
                    evaluation.question_index,
                    session.score()
                );
            }
        }

        self.sessions.save(&session).await?;
        Ok((session, tick))
    }

    /// Moves past a revealed answer. Entering `Completed` saves the session and then
    /// dispatches the ledger flush without waiting for it.
    pub async fn advance(
        &self,
        caller: Option<&str>,
        session_id: &str,
    ) -> Result<Advanced, ApiError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_owned(caller, session_id).await?;

        let advance = session.next()?;
        self.sessions.save(&session).await?;

        let flush = match advance {
            Advance::Question { index } => {
                tracing::debug!("Session {} moved to question {}", session_id, index);
                None
            }
            Advance::Completed(plan) => {
                QUIZ_SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
                QUIZ_SESSIONS_ACTIVE.dec();
                tracing::info!(
                    "Session {} completed: score={}, correct={}, wrong={}",
                    session_id,
                    session.score(),
                    session.correct_count(),
                    session.wrong_count()
                );
                plan.map(|plan| self.flusher.dispatch(plan))
            }
        };

        Ok(Advanced { session, flush })
    }

    /// Discards the playthrough and runs a fresh selection.
    pub async fn restart(
        &self,
        caller: Option<&str>,
        session_id: &str,
    ) -> Result<QuizSession, ApiError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_owned(caller, session_id).await?;

        if in_play(session.phase()) {
            QUIZ_SESSIONS_ACTIVE.dec();
        }
        session.restart();

        let batch = self.fetch_batch(&session).await;
        session.load(batch)?;
        self.sessions.save(&session).await?;

        QUIZ_SESSIONS_TOTAL.with_label_values(&["restarted"]).inc();
        self.record_load(&session);

        tracing::info!(
            "Session {} restarted ({} questions, phase {})",
            session_id,
            session.total_questions(),
            session.phase()
        );
        Ok(session)
    }

    async fn fetch_batch(&self, session: &QuizSession) -> Result<Vec<Question>, LoadFailure> {
        self.selector
            .select(session.category(), session.user_id())
            .await
            .map_err(|e| {
                tracing::error!("Question fetch failed for session {}: {}", session.id(), e);
                LoadFailure::FetchFailed {
                    message: "Failed to fetch questions. Please choose a category again."
                        .to_string(),
                }
            })
    }

    fn record_load(&self, session: &QuizSession) {
        if in_play(session.phase()) {
            QUIZ_SESSIONS_ACTIVE.inc();
        } else {
            QUIZ_SESSIONS_TOTAL.with_label_values(&["failed"]).inc();
        }
    }

    /// Sessions of identified callers are invisible to everyone else.
    async fn load_owned(
        &self,
        caller: Option<&str>,
        session_id: &str,
    ) -> Result<QuizSession, ApiError> {
        let session = self
            .sessions
            .load(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("session".to_string()))?;

        match session.user_id() {
            Some(owner) if caller != Some(owner) => {
                tracing::warn!("Session {} requested by a non-owner", session_id);
                Err(ApiError::NotFound("session".to_string()))
            }
            _ => Ok(session),
        }
    }
}
