// src/models/quiz.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::question::{CreateQuestionRequest, PublicQuestion, Question};

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,

    /// 'easy', 'medium' or 'hard'.
    pub difficulty: String,

    /// Time allowed for one attempt. `None` means untimed.
    pub time_limit_minutes: Option<i32>,

    pub max_attempts: i32,

    /// 'draft', 'scheduled', 'published' or 'archived'.
    pub status: String,

    pub source_document_id: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Quiz {
    pub fn status(&self) -> QuizStatus {
        self.status.parse().unwrap_or(QuizStatus::Draft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl QuizStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizStatus::Draft => "draft",
            QuizStatus::Scheduled => "scheduled",
            QuizStatus::Published => "published",
            QuizStatus::Archived => "archived",
        }
    }

    /// Status of the quiz after a publication to one group is recorded.
    ///
    /// An immediate publication always makes the quiz published. A scheduled
    /// one never demotes a quiz that is already published.
    pub fn after_publication(self, immediate: bool) -> QuizStatus {
        match (self, immediate) {
            (_, true) => QuizStatus::Published,
            (QuizStatus::Published, false) => QuizStatus::Published,
            (_, false) => QuizStatus::Scheduled,
        }
    }
}

impl FromStr for QuizStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(QuizStatus::Draft),
            "scheduled" => Ok(QuizStatus::Scheduled),
            "published" => Ok(QuizStatus::Published),
            "archived" => Ok(QuizStatus::Archived),
            other => Err(format!("Unknown quiz status '{}'", other)),
        }
    }
}

/// Full quiz as seen by its author (answers included).
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<Question>,
}

/// Quiz card shown to students.
#[derive(Debug, Serialize, FromRow)]
pub struct AvailableQuiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: i32,
    pub question_count: i64,
    pub attempts_used: i64,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Quiz as delivered inside a quiz-taking session (no answers).
#[derive(Debug, Serialize)]
pub struct PublicQuiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub time_limit_minutes: Option<i32>,
    pub questions: Vec<PublicQuestion>,
}

/// DTO for creating a quiz by hand.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    #[validate(nested)]
    #[serde(default)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// DTO for updating quiz metadata. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    /// `0` makes the quiz untimed.
    #[validate(range(min = 0, max = 600))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    /// Only 'draft' and 'archived' can be set by hand; publishing has its own endpoint.
    pub status: Option<QuizStatus>,
}

impl UpdateQuizRequest {
    /// New value of the time limit column, if the request changes it.
    pub fn time_limit(&self) -> Option<Option<i32>> {
        self.time_limit_minutes.map(|m| (m > 0).then_some(m))
    }
}

/// DTO for asking the generator to build a quiz from a document.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateQuizRequest {
    pub document_id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(range(min = 1, max = 50))]
    pub num_questions: Option<usize>,
    pub difficulty: Option<Difficulty>,
    #[validate(range(min = 1, max = 600))]
    pub time_limit_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderQuestionsRequest {
    pub question_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_publication_always_publishes() {
        for status in [
            QuizStatus::Draft,
            QuizStatus::Scheduled,
            QuizStatus::Published,
            QuizStatus::Archived,
        ] {
            assert_eq!(status.after_publication(true), QuizStatus::Published);
        }
    }

    #[test]
    fn test_zero_time_limit_clears_it() {
        let update: UpdateQuizRequest =
            serde_json::from_value(serde_json::json!({"time_limit_minutes": 0})).unwrap();
        assert!(update.validate().is_ok());
        assert_eq!(update.time_limit(), Some(None));

        let update: UpdateQuizRequest =
            serde_json::from_value(serde_json::json!({"time_limit_minutes": 20})).unwrap();
        assert_eq!(update.time_limit(), Some(Some(20)));

        let update: UpdateQuizRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(update.time_limit(), None);
    }

    #[test]
    fn test_scheduled_publication_never_demotes() {
        assert_eq!(
            QuizStatus::Draft.after_publication(false),
            QuizStatus::Scheduled
        );
        assert_eq!(
            QuizStatus::Published.after_publication(false),
            QuizStatus::Published
        );
    }
}
