// src/models/response.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

/// Represents the 'quiz_responses' table: one student's attempt at a quiz.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizResponse {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,

    /// 'in_progress' or 'submitted'.
    pub status: String,

    /// Per-question answer state, in no particular order.
    pub answers: Json<Vec<AnswerEntry>>,

    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,

    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub correct_count: Option<i32>,
    pub total_questions: Option<i32>,
    pub percentage: Option<f64>,

    /// Per-question grading, filled on submission.
    pub results: Option<Json<Vec<QuestionOutcome>>>,

    pub insights: Option<String>,
    /// 'ai' or 'local'.
    pub insights_source: Option<String>,
    pub insights_generated_at: Option<DateTime<Utc>>,
}

impl QuizResponse {
    pub fn status(&self) -> ResponseStatus {
        self.status.parse().unwrap_or(ResponseStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Submitted,
}

impl FromStr for ResponseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ResponseStatus::InProgress),
            "submitted" => Ok(ResponseStatus::Submitted),
            other => Err(format!("Unknown response status '{}'", other)),
        }
    }
}

/// State of one question inside an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: i64,
    /// `None` when the question was visited or flagged but not answered.
    pub answer: Option<String>,
    /// Seconds spent on the question, accumulated across visits.
    #[serde(default)]
    pub time_spent_seconds: i64,
    #[serde(default)]
    pub flagged: bool,
    pub answered_at: Option<DateTime<Utc>>,
}

impl AnswerEntry {
    pub fn new(question_id: i64) -> Self {
        Self {
            question_id,
            answer: None,
            time_spent_seconds: 0,
            flagged: false,
            answered_at: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Grading of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: i64,
    pub answer: Option<String>,
    pub correct_answer: String,
    pub is_correct: bool,
    pub points_earned: i32,
    pub points_possible: i32,
    pub time_spent_seconds: i64,
    pub explanation: Option<String>,
}

/// DTO for saving one answer during an attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: i64,
    /// `null` clears a previous answer.
    #[validate(length(max = 1000))]
    pub answer: Option<String>,
    /// Seconds spent on the question since the last save.
    #[validate(range(min = 0, max = 86400))]
    #[serde(default)]
    pub time_spent_seconds: i64,
    pub flagged: Option<bool>,
}

/// Row used by the teacher-facing response list.
#[derive(Debug, Serialize, FromRow)]
pub struct ResponseSummary {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub username: String,
    pub status: String,
    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percentage: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Row used by the student's own history.
#[derive(Debug, Serialize, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub status: String,
    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percentage: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub percentage: f64,
    pub score: i32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct InsightsParams {
    #[serde(default)]
    pub refresh: bool,
}
