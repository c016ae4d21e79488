use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::ApiError;

/// Every question offers exactly this many options.
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
    Extreme,
}

/// A multiple-choice question. Option order defines the answer index mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: i32,
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Out-of-range indices (including the timeout sentinel) are never correct.
    pub fn is_correct(&self, index: i32) -> bool {
        index == self.correct_answer
    }
}

/// Validated authoring payload, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub text: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub correct_answer: i32,
    pub category: String,
    pub difficulty: Difficulty,
    pub created_by: Option<String>,
}

/// Filter applied by the question store when sampling a batch.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    /// Case-insensitive exact category match; `None` matches every category.
    pub category: Option<String>,
    /// Question ids that must not be returned.
    pub exclude: HashSet<String>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        if self.exclude.contains(&question.id) {
            return false;
        }
        match &self.category {
            Some(category) => question.category.to_lowercase() == category.to_lowercase(),
            None => true,
        }
    }
}

/// POST /api/v1/questions body.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(required(message = "text is required"))]
    pub text: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[validate(required(message = "options are required"))]
    pub options: Option<Vec<String>>,

    #[serde(alias = "correctAnswer")]
    #[validate(
        required(message = "correct_answer is required"),
        range(min = 0, max = 3, message = "correct_answer must be an option index between 0 and 3")
    )]
    pub correct_answer: Option<i32>,

    #[validate(required(message = "category is required"))]
    pub category: Option<String>,

    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl CreateQuestionRequest {
    /// Checks every constraint and reports all violated fields at once.
    /// The only value ever filled in is the difficulty default.
    pub fn into_draft(self, created_by: Option<String>) -> Result<QuestionDraft, ApiError> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if self.text.as_deref().is_some_and(is_blank) {
            errors.add("text", violation("blank", "text must not be blank"));
        }
        if self.category.as_deref().is_some_and(is_blank) {
            errors.add("category", violation("blank", "category must not be blank"));
        }
        if let Some(options) = &self.options {
            if options.len() != OPTION_COUNT {
                let message = format!("exactly {} options are required", OPTION_COUNT);
                errors.add("options", ValidationError::new("length").with_message(message.into()));
            }
            if options.iter().any(|option| is_blank(option)) {
                errors.add("options", violation("blank", "options must not be blank"));
            }
            let distinct: HashSet<&str> = options.iter().map(|o| o.trim()).collect();
            if distinct.len() != options.len() {
                errors.add("options", violation("distinct", "options must be distinct"));
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        let (Some(text), Some(options), Some(correct_answer), Some(category)) =
            (self.text, self.options, self.correct_answer, self.category)
        else {
            return Err(ApiError::field("body", "incomplete question payload"));
        };

        Ok(QuestionDraft {
            text: text.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            options,
            correct_answer,
            category: category.trim().to_string(),
            difficulty: self.difficulty.unwrap_or_default(),
            created_by,
        })
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}
