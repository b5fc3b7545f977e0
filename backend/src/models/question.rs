// src/models/question.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::{Validate, ValidationError};

/// Separator between correct options of a 'multiple' question.
pub const MULTI_ANSWER_SEPARATOR: char = '|';

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// Zero-based order inside the quiz.
    pub position: i32,

    /// Question type: 'single', 'multiple', 'true_false' or 'short'.
    /// Mapped from the database column 'type' since `type` is a reserved keyword in Rust.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: String,

    /// The text content of the question.
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database. Empty for 'short' questions.
    pub options: Json<Vec<String>>,

    /// The correct answer. For 'multiple' questions, correct options joined by '|'.
    pub answer: String,

    /// Explanation shown to the student once the response is submitted.
    pub explanation: Option<String>,

    pub points: i32,

    /// Per-question time budget in seconds, if any.
    pub time_limit_seconds: Option<i32>,
}

impl Question {
    pub fn kind(&self) -> QuestionType {
        self.question_type.parse().unwrap_or(QuestionType::Single)
    }

    pub fn to_public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            position: self.position,
            question_type: self.question_type.clone(),
            content: self.content.clone(),
            options: self.options.clone(),
            points: self.points,
            time_limit_seconds: self.time_limit_seconds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Single,
    Multiple,
    TrueFalse,
    Short,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Single => "single",
            QuestionType::Multiple => "multiple",
            QuestionType::TrueFalse => "true_false",
            QuestionType::Short => "short",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionType::Single),
            "multiple" => Ok(QuestionType::Multiple),
            "true_false" => Ok(QuestionType::TrueFalse),
            "short" => Ok(QuestionType::Short),
            other => Err(format!("Unknown question type '{}'", other)),
        }
    }
}

/// DTO for sending question to client (excludes answer and explanation).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub position: i32,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub points: i32,
    pub time_limit_seconds: Option<i32>,
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_question_shape))]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    #[serde(default)]
    pub options: Vec<String>,
    #[validate(length(min = 1, max = 1000))]
    pub answer: String,
    #[validate(length(max = 4000))]
    pub explanation: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    #[validate(range(min = 5, max = 3600))]
    pub time_limit_seconds: Option<i32>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: Option<QuestionType>,
    #[validate(length(min = 1, max = 2000))]
    pub content: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    #[validate(length(min = 1, max = 1000))]
    pub answer: Option<String>,
    #[validate(length(max = 4000))]
    pub explanation: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    #[validate(range(min = 5, max = 3600))]
    pub time_limit_seconds: Option<i32>,
}

fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() > 10 {
        return Err(ValidationError::new("too_many_options"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Cross-field checks: choice questions need options and an answer among them.
fn validate_question_shape(req: &CreateQuestionRequest) -> Result<(), ValidationError> {
    check_shape(req.question_type, &req.options, &req.answer)
}

/// Checks that `answer` is consistent with `options` for the given question type.
pub fn check_shape(
    question_type: QuestionType,
    options: &[String],
    answer: &str,
) -> Result<(), ValidationError> {
    let has_option = |candidate: &str| {
        options
            .iter()
            .any(|o| o.trim().eq_ignore_ascii_case(candidate.trim()))
    };

    match question_type {
        QuestionType::Single | QuestionType::TrueFalse => {
            if options.len() < 2 {
                return Err(ValidationError::new("at_least_two_options_required"));
            }
            if !has_option(answer) {
                return Err(ValidationError::new("answer_not_in_options"));
            }
        }
        QuestionType::Multiple => {
            if options.len() < 2 {
                return Err(ValidationError::new("at_least_two_options_required"));
            }
            let parts: Vec<&str> = answer
                .split(MULTI_ANSWER_SEPARATOR)
                .filter(|p| !p.trim().is_empty())
                .collect();
            if parts.is_empty() || !parts.iter().all(|p| has_option(p)) {
                return Err(ValidationError::new("answer_not_in_options"));
            }
        }
        QuestionType::Short => {
            if answer.trim().is_empty() {
                return Err(ValidationError::new("answer_cannot_be_empty"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_answer_must_be_an_option() {
        let options = opts(&["Paris", "Rome"]);
        assert!(check_shape(QuestionType::Single, &options, "paris").is_ok());
        assert!(check_shape(QuestionType::Single, &options, "Berlin").is_err());
        assert!(check_shape(QuestionType::Single, &opts(&["Paris"]), "Paris").is_err());
    }

    #[test]
    fn test_multiple_answer_parts_must_be_options() {
        let options = opts(&["2", "3", "4", "5"]);
        assert!(check_shape(QuestionType::Multiple, &options, "2|3|5").is_ok());
        assert!(check_shape(QuestionType::Multiple, &options, "2|6").is_err());
        assert!(check_shape(QuestionType::Multiple, &options, "|").is_err());
    }

    #[test]
    fn test_short_answer_needs_no_options() {
        assert!(check_shape(QuestionType::Short, &[], "photosynthesis").is_ok());
        assert!(check_shape(QuestionType::Short, &[], "   ").is_err());
    }

    #[test]
    fn test_request_validation_runs_shape_check() {
        let req = CreateQuestionRequest {
            question_type: QuestionType::Single,
            content: "Capital of France?".to_string(),
            options: opts(&["Paris", "Rome"]),
            answer: "Madrid".to_string(),
            explanation: None,
            points: None,
            time_limit_seconds: None,
        };
        assert!(req.validate().is_err());
    }
}
