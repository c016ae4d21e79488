//! Quiz session state machine.
//!
//! A session walks `Loading -> InProgress(i) -> AnswerRevealed(i) -> InProgress(i+1) ...
//! -> Completed`, or ends in `Failed` when no batch could be loaded. All transitions
//! are synchronous and side-effect free; completion hands back a [`FlushPlan`] that the
//! caller dispatches to the ledgers.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ledger::ProgressUpdate, question::Question};

pub const CORRECT_POINTS: i32 = 10;
pub const WRONG_PENALTY: i32 = 1;
/// Answer recorded when the countdown expires twice. Never matches an option.
pub const TIMEOUT_ANSWER: i32 = -1;
/// Score category used for sessions played without a category filter.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Loading,
    InProgress,
    AnswerRevealed,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Loading => "loading",
            SessionPhase::InProgress => "in_progress",
            SessionPhase::AnswerRevealed => "answer_revealed",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session could not enter play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadFailure {
    /// The selector returned an empty batch: unknown category or everything solved.
    NoQuestions { message: String },
    /// The question store could not be reached.
    FetchFailed { message: String },
}

impl LoadFailure {
    pub fn message(&self) -> &str {
        match self {
            LoadFailure::NoQuestions { message } | LoadFailure::FetchFailed { message } => message,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("questions can only be loaded while the session is loading (session is {0})")]
    NotLoading(SessionPhase),
    #[error("no question is awaiting an answer (session is {0})")]
    NoActiveQuestion(SessionPhase),
    #[error("cannot advance before the answer is revealed (session is {0})")]
    NotRevealed(SessionPhase),
}

/// Per-question result accumulated for the progress flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub question_id: String,
    pub category: String,
    pub is_correct: bool,
}

/// Result of evaluating one answer (user-submitted or timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub question_index: usize,
    pub selected: i32,
    pub is_correct: bool,
    pub timed_out: bool,
    pub score_delta: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No question is counting down; nothing changed.
    Idle,
    Counting { remaining: u32 },
    /// First expiry on this question: the countdown was replenished.
    BonusGranted { remaining: u32 },
    /// Second expiry: the timeout sentinel was submitted.
    TimedOut(Evaluation),
}

/// Persistence work produced exactly once, on entering `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushPlan {
    pub user_id: String,
    pub category: String,
    /// Only positive scores are recorded.
    pub score: Option<i32>,
    pub progress: Vec<ProgressUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Question { index: usize },
    /// `None` for anonymous sessions, which persist nothing.
    Completed(Option<FlushPlan>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizSession {
    id: String,
    user_id: Option<String>,
    category: Option<String>,
    phase: SessionPhase,
    questions: Vec<Question>,
    current_index: usize,
    selected_answer: Option<i32>,
    score: i32,
    correct_count: u32,
    wrong_count: u32,
    countdown: u32,
    countdown_budget: u32,
    bonus_used: bool,
    outcomes: Vec<AnswerOutcome>,
    failure: Option<LoadFailure>,
    /// When the countdown last consumed a unit for the current question.
    #[serde(default)]
    last_tick_at: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(user_id: Option<String>, category: Option<String>, countdown_budget: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            category,
            phase: SessionPhase::Loading,
            questions: Vec::new(),
            current_index: 0,
            selected_answer: None,
            score: 0,
            correct_count: 0,
            wrong_count: 0,
            countdown: countdown_budget,
            countdown_budget,
            bonus_used: false,
            outcomes: Vec::new(),
            failure: None,
            last_tick_at: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn question_index(&self) -> usize {
        self.current_index
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// The question being played or revealed, if any.
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            SessionPhase::InProgress | SessionPhase::AnswerRevealed => {
                self.questions.get(self.current_index)
            }
            _ => None,
        }
    }

    pub fn selected_answer(&self) -> Option<i32> {
        self.selected_answer
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn wrong_count(&self) -> u32 {
        self.wrong_count
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn bonus_used(&self) -> bool {
        self.bonus_used
    }

    pub fn failure(&self) -> Option<&LoadFailure> {
        self.failure.as_ref()
    }

    /// Label under which this session's score is recorded.
    pub fn score_category(&self) -> &str {
        self.category.as_deref().unwrap_or(ALL_CATEGORIES)
    }

    /// Applies the result of the question fetch.
    pub fn load(&mut self, batch: Result<Vec<Question>, LoadFailure>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Loading {
            return Err(SessionError::NotLoading(self.phase));
        }

        match batch {
            Ok(questions) if questions.is_empty() => {
                let message = format!(
                    "No questions found (or all completed!) for category: {}",
                    self.score_category()
                );
                self.fail(LoadFailure::NoQuestions { message });
            }
            Ok(questions) => {
                // Filters match case-insensitively; record under the stored spelling.
                if self.category.is_some() {
                    self.category = Some(questions[0].category.clone());
                }
                self.questions = questions;
                self.current_index = 0;
                self.reset_question_clock();
                self.phase = SessionPhase::InProgress;
            }
            Err(failure) => self.fail(failure),
        }

        self.touch();
        Ok(())
    }

    /// Advances the countdown by one unit, unless the previous unit for this question
    /// was consumed less than `min_interval` before `now`. Every clock driver of a
    /// session (SSE streams, `/tick` callers) shares one countdown this way.
    pub fn tick_at(&mut self, now: DateTime<Utc>, min_interval: TimeDelta) -> Tick {
        if self.phase != SessionPhase::InProgress || self.selected_answer.is_some() {
            return Tick::Idle;
        }
        if let Some(last) = self.last_tick_at {
            if now - last < min_interval {
                return Tick::Idle;
            }
        }

        self.last_tick_at = Some(now);
        self.tick()
    }

    /// Advances the countdown by one unit.
    pub fn tick(&mut self) -> Tick {
        if self.phase != SessionPhase::InProgress || self.selected_answer.is_some() {
            return Tick::Idle;
        }

        self.countdown = self.countdown.saturating_sub(1);
        self.touch();

        if self.countdown > 0 {
            return Tick::Counting {
                remaining: self.countdown,
            };
        }

        if !self.bonus_used {
            self.bonus_used = true;
            self.countdown = self.countdown_budget;
            return Tick::BonusGranted {
                remaining: self.countdown,
            };
        }

        Tick::TimedOut(self.evaluate(TIMEOUT_ANSWER, true))
    }

    /// Submits an answer for the current question. The first submission wins;
    /// later ones return `Ok(None)` and change nothing.
    pub fn submit(&mut self, index: i32) -> Result<Option<Evaluation>, SessionError> {
        match self.phase {
            SessionPhase::InProgress => {
                let evaluation = self.evaluate(index, false);
                self.touch();
                Ok(Some(evaluation))
            }
            SessionPhase::AnswerRevealed => Ok(None),
            phase => Err(SessionError::NoActiveQuestion(phase)),
        }
    }

    /// Moves past a revealed answer, completing the session after the last question.
    pub fn next(&mut self) -> Result<Advance, SessionError> {
        if self.phase != SessionPhase::AnswerRevealed {
            return Err(SessionError::NotRevealed(self.phase));
        }
        self.touch();

        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
            self.reset_question_clock();
            self.phase = SessionPhase::InProgress;
            return Ok(Advance::Question {
                index: self.current_index,
            });
        }

        self.phase = SessionPhase::Completed;
        Ok(Advance::Completed(self.flush_plan()))
    }

    /// Discards all transient state and returns to `Loading`, ready for a fresh batch.
    pub fn restart(&mut self) {
        self.phase = SessionPhase::Loading;
        self.questions.clear();
        self.current_index = 0;
        self.score = 0;
        self.correct_count = 0;
        self.wrong_count = 0;
        self.outcomes.clear();
        self.failure = None;
        self.reset_question_clock();
        self.started_at = Utc::now();
        self.touch();
    }

    fn evaluate(&mut self, index: i32, timed_out: bool) -> Evaluation {
        let (question_id, category, is_correct) = match self.questions.get(self.current_index) {
            Some(question) => (
                question.id.clone(),
                question.category.clone(),
                question.is_correct(index),
            ),
            None => (String::new(), self.score_category().to_string(), false),
        };

        let score_delta = if is_correct {
            self.correct_count += 1;
            CORRECT_POINTS
        } else {
            self.wrong_count += 1;
            -WRONG_PENALTY
        };
        self.score += score_delta;

        self.outcomes.push(AnswerOutcome {
            question_id,
            category,
            is_correct,
        });
        self.selected_answer = Some(index);
        self.phase = SessionPhase::AnswerRevealed;

        Evaluation {
            question_index: self.current_index,
            selected: index,
            is_correct,
            timed_out,
            score_delta,
        }
    }

    fn flush_plan(&self) -> Option<FlushPlan> {
        let user_id = self.user_id.clone()?;
        Some(FlushPlan {
            user_id,
            category: self.score_category().to_string(),
            score: (self.score > 0).then_some(self.score),
            progress: self
                .outcomes
                .iter()
                .map(|outcome| ProgressUpdate {
                    question_id: outcome.question_id.clone(),
                    is_correct: outcome.is_correct,
                    category: outcome.category.clone(),
                })
                .collect(),
        })
    }

    fn fail(&mut self, failure: LoadFailure) {
        self.questions.clear();
        self.failure = Some(failure);
        self.phase = SessionPhase::Failed;
    }

    fn reset_question_clock(&mut self) {
        self.countdown = self.countdown_budget;
        self.bonus_used = false;
        self.selected_answer = None;
        self.last_tick_at = None;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Difficulty;

    const BUDGET: u32 = 30;

    fn question(id: &str, category: &str, correct_answer: i32) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {}", id),
            description: None,
            options: vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
                "D".to_string(),
            ],
            correct_answer,
            category: category.to_string(),
            difficulty: Difficulty::Easy,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    fn started(user: Option<&str>, questions: Vec<Question>) -> QuizSession {
        let mut session =
            QuizSession::new(user.map(str::to_string), Some("Science".to_string()), BUDGET);
        session.load(Ok(questions)).unwrap();
        session
    }

    fn run_clock(session: &mut QuizSession, ticks: u32) -> Tick {
        let mut last = Tick::Idle;
        for _ in 0..ticks {
            last = session.tick();
        }
        last
    }

    #[test]
    fn load_enters_first_question_with_full_countdown() {
        let session = started(Some("u1"), vec![question("q1", "Science", 0)]);
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.question_index(), 0);
        assert_eq!(session.countdown(), BUDGET);
        assert!(!session.bonus_used());
        assert_eq!(session.current_question().unwrap().id, "q1");
    }

    #[test]
    fn empty_batch_fails_the_session() {
        let mut session = QuizSession::new(None, Some("Geology".to_string()), BUDGET);
        session.load(Ok(vec![])).unwrap();
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert!(matches!(
            session.failure(),
            Some(LoadFailure::NoQuestions { message }) if message.contains("Geology")
        ));
        assert_eq!(
            session.submit(0),
            Err(SessionError::NoActiveQuestion(SessionPhase::Failed))
        );
    }

    #[test]
    fn fetch_failure_is_terminal() {
        let mut session = QuizSession::new(None, None, BUDGET);
        session
            .load(Err(LoadFailure::FetchFailed {
                message: "down".to_string(),
            }))
            .unwrap();
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(session.tick(), Tick::Idle);
        assert_eq!(
            session.load(Ok(vec![question("q1", "Science", 0)])),
            Err(SessionError::NotLoading(SessionPhase::Failed))
        );
    }

    #[test]
    fn correct_and_wrong_answers_score_ten_and_minus_one() {
        let mut session = started(
            Some("u1"),
            vec![question("q1", "Science", 2), question("q2", "Science", 1)],
        );

        let first = session.submit(2).unwrap().unwrap();
        assert!(first.is_correct);
        assert_eq!(first.score_delta, 10);
        assert_eq!(session.phase(), SessionPhase::AnswerRevealed);

        session.next().unwrap();
        let second = session.submit(3).unwrap().unwrap();
        assert!(!second.is_correct);
        assert_eq!(second.score_delta, -1);

        assert_eq!(session.score(), 9);
        assert_eq!(session.correct_count(), 1);
        assert_eq!(session.wrong_count(), 1);
    }

    #[test]
    fn second_submission_is_a_no_op() {
        let mut session = started(Some("u1"), vec![question("q1", "Science", 0)]);
        session.submit(1).unwrap();
        let snapshot = session.clone();

        assert_eq!(session.submit(0), Ok(None));
        assert_eq!(session.score(), snapshot.score());
        assert_eq!(session.wrong_count(), snapshot.wrong_count());
        assert_eq!(session.correct_count(), snapshot.correct_count());
        assert_eq!(session.selected_answer(), Some(1));
        assert_eq!(session.outcomes.len(), 1);
    }

    #[test]
    fn out_of_range_answer_counts_as_wrong() {
        let mut session = started(None, vec![question("q1", "Science", 0)]);
        let evaluation = session.submit(9).unwrap().unwrap();
        assert!(!evaluation.is_correct);
        assert_eq!(session.score(), -1);
    }

    #[test]
    fn first_expiry_grants_bonus_without_scoring() {
        let mut session = started(Some("u1"), vec![question("q1", "Science", 0)]);

        assert_eq!(run_clock(&mut session, BUDGET - 1), Tick::Counting { remaining: 1 });
        assert_eq!(session.tick(), Tick::BonusGranted { remaining: BUDGET });
        assert_eq!(session.countdown(), BUDGET);
        assert!(session.bonus_used());
        assert_eq!(session.score(), 0);
        assert_eq!(session.correct_count() + session.wrong_count(), 0);
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[test]
    fn second_expiry_submits_timeout_sentinel() {
        let mut session = started(Some("u1"), vec![question("q1", "Science", 0)]);
        run_clock(&mut session, BUDGET);

        let last = run_clock(&mut session, BUDGET);
        let Tick::TimedOut(evaluation) = last else {
            panic!("expected timeout, got {:?}", last);
        };
        assert!(evaluation.timed_out);
        assert_eq!(evaluation.selected, TIMEOUT_ANSWER);
        assert_eq!(session.score(), -1);
        assert_eq!(session.wrong_count(), 1);
        assert_eq!(session.phase(), SessionPhase::AnswerRevealed);
        assert_eq!(session.tick(), Tick::Idle);
    }

    #[test]
    fn countdown_stops_after_submission() {
        let mut session = started(None, vec![question("q1", "Science", 0)]);
        session.tick();
        session.submit(0).unwrap();
        let frozen = session.countdown();
        assert_eq!(session.tick(), Tick::Idle);
        assert_eq!(session.countdown(), frozen);
    }

    #[test]
    fn next_resets_clock_and_bonus() {
        let mut session = started(
            Some("u1"),
            vec![question("q1", "Science", 0), question("q2", "Science", 0)],
        );
        run_clock(&mut session, BUDGET + 3);
        session.submit(0).unwrap();

        assert_eq!(session.next(), Ok(Advance::Question { index: 1 }));
        assert_eq!(session.countdown(), BUDGET);
        assert!(!session.bonus_used());
        assert_eq!(session.selected_answer(), None);
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[test]
    fn next_requires_revealed_answer() {
        let mut session = started(None, vec![question("q1", "Science", 0)]);
        assert_eq!(
            session.next(),
            Err(SessionError::NotRevealed(SessionPhase::InProgress))
        );
    }

    #[test]
    fn science_scenario_completes_with_flush_plan() {
        let mut session = started(
            Some("user-7"),
            vec![question("q1", "Science", 1), question("q2", "Science", 3)],
        );

        session.submit(1).unwrap();
        assert_eq!(session.score(), 10);
        session.next().unwrap();

        run_clock(&mut session, BUDGET * 2);
        assert_eq!(session.score(), 9);

        let Ok(Advance::Completed(Some(plan))) = session.next() else {
            panic!("expected completion with a flush plan");
        };
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(session.correct_count(), 1);
        assert_eq!(session.wrong_count(), 1);
        assert_eq!(plan.user_id, "user-7");
        assert_eq!(plan.category, "Science");
        assert_eq!(plan.score, Some(9));
        assert_eq!(
            plan.progress,
            vec![
                ProgressUpdate {
                    question_id: "q1".to_string(),
                    is_correct: true,
                    category: "Science".to_string(),
                },
                ProgressUpdate {
                    question_id: "q2".to_string(),
                    is_correct: false,
                    category: "Science".to_string(),
                },
            ]
        );

        assert_eq!(
            session.next(),
            Err(SessionError::NotRevealed(SessionPhase::Completed))
        );
    }

    #[test]
    fn non_positive_score_skips_score_but_keeps_progress() {
        let mut session = started(
            Some("u1"),
            vec![
                question("q1", "Science", 0),
                question("q2", "Science", 0),
                question("q3", "Science", 0),
            ],
        );
        for _ in 0..2 {
            session.submit(1).unwrap();
            session.next().unwrap();
        }
        session.submit(1).unwrap();

        let Ok(Advance::Completed(Some(plan))) = session.next() else {
            panic!("expected completion");
        };
        assert_eq!(session.score(), -3);
        assert_eq!(plan.score, None);
        assert_eq!(plan.progress.len(), 3);
    }

    #[test]
    fn anonymous_completion_has_no_flush_plan() {
        let mut session = started(None, vec![question("q1", "Science", 0)]);
        session.submit(0).unwrap();
        assert_eq!(session.next(), Ok(Advance::Completed(None)));
    }

    #[test]
    fn score_identity_holds_for_mixed_play() {
        let answers = [0, 1, 0, 9, 0, 2];
        let questions = (0..answers.len())
            .map(|i| question(&format!("q{}", i), "Science", 0))
            .collect();
        let mut session = started(Some("u1"), questions);

        for (i, answer) in answers.iter().enumerate() {
            if i == 4 {
                run_clock(&mut session, BUDGET * 2);
            } else {
                session.submit(*answer).unwrap();
            }
            session.next().unwrap();
        }

        let answered = session.correct_count() + session.wrong_count();
        assert_eq!(answered as usize, answers.len());
        assert_eq!(
            session.score(),
            10 * session.correct_count() as i32 - session.wrong_count() as i32
        );
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[test]
    fn restart_discards_transient_state() {
        let mut session = started(Some("u1"), vec![question("q1", "Science", 0)]);
        run_clock(&mut session, BUDGET + 2);
        session.submit(0).unwrap();
        session.next().unwrap();

        let id = session.id().to_string();
        session.restart();

        assert_eq!(session.id(), id);
        assert_eq!(session.phase(), SessionPhase::Loading);
        assert_eq!(session.score(), 0);
        assert_eq!(session.correct_count(), 0);
        assert_eq!(session.wrong_count(), 0);
        assert_eq!(session.question_index(), 0);
        assert_eq!(session.countdown(), BUDGET);
        assert!(!session.bonus_used());
        assert!(session.outcomes.is_empty());
        assert_eq!(session.total_questions(), 0);
        assert_eq!(session.user_id(), Some("u1"));
        assert_eq!(session.category(), Some("Science"));
    }
    #[test]
    fn ticks_closer_than_the_interval_share_one_unit() {
        let mut session = started(Some("u1"), vec![question("q1", "Science", 0)]);
        let interval = TimeDelta::milliseconds(1000);
        let t0 = Utc::now();

        assert_eq!(
            session.tick_at(t0, interval),
            Tick::Counting { remaining: BUDGET - 1 }
        );
        assert_eq!(
            session.tick_at(t0 + TimeDelta::milliseconds(400), interval),
            Tick::Idle
        );
        assert_eq!(session.countdown(), BUDGET - 1);
        assert_eq!(
            session.tick_at(t0 + interval, interval),
            Tick::Counting { remaining: BUDGET - 2 }
        );
    }

    #[test]
    fn next_question_starts_its_own_tick_window() {
        let mut session = started(
            Some("u1"),
            vec![question("q1", "Science", 0), question("q2", "Science", 0)],
        );
        let interval = TimeDelta::milliseconds(1000);
        let t0 = Utc::now();

        session.tick_at(t0, interval);
        session.submit(0).unwrap();
        session.next().unwrap();

        assert_eq!(
            session.tick_at(t0 + TimeDelta::milliseconds(10), interval),
            Tick::Counting { remaining: BUDGET - 1 }
        );
    }

    #[test]
    fn filtered_session_records_the_stored_category_spelling() {
        let mut session =
            QuizSession::new(Some("u1".to_string()), Some("science".to_string()), BUDGET);
        session.load(Ok(vec![question("q1", "Science", 0)])).unwrap();
        assert_eq!(session.category(), Some("Science"));

        session.submit(0).unwrap();
        let Ok(Advance::Completed(Some(plan))) = session.next() else {
            panic!("expected a flush plan");
        };
        assert_eq!(plan.category, "Science");
    }

    #[test]
    fn unfiltered_session_scores_under_all() {
        let mut session = QuizSession::new(Some("u1".to_string()), None, BUDGET);
        session.load(Ok(vec![question("q1", "History", 0)])).unwrap();
        assert_eq!(session.category(), None);
        assert_eq!(session.score_category(), ALL_CATEGORIES);
    }
}
