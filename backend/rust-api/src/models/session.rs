use serde::{Deserialize, Serialize};

use crate::models::question::{Difficulty, Question};
use crate::services::session_machine::{LoadFailure, QuizSession, SessionPhase};

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    #[serde(alias = "index")]
    pub answer: i32,
}

/// Question as shown during play: the correct answer stays hidden.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<String>,
    pub category: String,
    pub difficulty: Difficulty,
}

impl From<&Question> for QuestionView {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            description: question.description.clone(),
            options: question.options.clone(),
            category: question.category.clone(),
            difficulty: question.difficulty,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub phase: SessionPhase,
    pub category: Option<String>,
    pub question_index: usize,
    pub total_questions: usize,
    pub question: Option<QuestionView>,
    pub selected_answer: Option<i32>,
    /// Present only once the current answer has been revealed.
    pub correct_answer: Option<i32>,
    pub score: i32,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub countdown: u32,
    pub bonus_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LoadFailure>,
}

impl From<&QuizSession> for SessionView {
    fn from(session: &QuizSession) -> Self {
        let question = session.current_question();
        let correct_answer = match session.phase() {
            SessionPhase::AnswerRevealed => question.map(|q| q.correct_answer),
            _ => None,
        };

        Self {
            id: session.id().to_string(),
            phase: session.phase(),
            category: session.category().map(str::to_string),
            question_index: session.question_index(),
            total_questions: session.total_questions(),
            question: question.map(QuestionView::from),
            selected_answer: session.selected_answer(),
            correct_answer,
            score: session.score(),
            correct_count: session.correct_count(),
            wrong_count: session.wrong_count(),
            countdown: session.countdown(),
            bonus_used: session.bonus_used(),
            error: session.failure().cloned(),
        }
    }
}
