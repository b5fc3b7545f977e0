// src/utils/access.rs

//! Loaders shared by handlers, each enforcing who may see the row.

use sqlx::{PgExecutor, PgPool};

use crate::{
    error::AppError,
    models::{
        group::Group,
        question::Question,
        quiz::Quiz,
        response::QuizResponse,
    },
    utils::jwt::Claims,
};

pub const QUIZ_COLUMNS: &str = "id, owner_id, title, description, difficulty, time_limit_minutes, \
     max_attempts, status, source_document_id, created_at, updated_at, published_at";

pub const QUESTION_COLUMNS: &str =
    "id, quiz_id, position, type, content, options, answer, explanation, points, time_limit_seconds";

pub const RESPONSE_COLUMNS: &str = "id, quiz_id, student_id, status, answers, started_at, deadline, \
     submitted_at, score, max_score, correct_count, total_questions, percentage, results, \
     insights, insights_source, insights_generated_at";

/// Fails with 403 unless the caller owns the row or is an admin.
pub fn ensure_owner(claims: &Claims, owner_id: i64, what: &str) -> Result<(), AppError> {
    if claims.is_admin() || claims.user_id()? == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("You do not own this {}", what)))
    }
}

pub async fn load_quiz(pool: &PgPool, id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(&format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
}

/// Loads a quiz the caller may manage (owner teacher or admin).
pub async fn load_owned_quiz(pool: &PgPool, id: i64, claims: &Claims) -> Result<Quiz, AppError> {
    let quiz = load_quiz(pool, id).await?;
    ensure_owner(claims, quiz.owner_id, "quiz")?;
    Ok(quiz)
}

/// Questions of a quiz in display order. Takes a pool or an open transaction.
pub async fn load_questions<'e, E>(executor: E, quiz_id: i64) -> Result<Vec<Question>, AppError>
where
    E: PgExecutor<'e>,
{
    let questions = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE quiz_id = $1 ORDER BY position, id",
        QUESTION_COLUMNS
    ))
    .bind(quiz_id)
    .fetch_all(executor)
    .await?;
    Ok(questions)
}

pub async fn load_owned_group(pool: &PgPool, id: i64, claims: &Claims) -> Result<Group, AppError> {
    let group = sqlx::query_as::<_, Group>(
        "SELECT id, owner_id, name, description, created_at FROM student_groups WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Group not found".to_string()))?;

    ensure_owner(claims, group.owner_id, "group")?;
    Ok(group)
}

pub async fn load_response(pool: &PgPool, id: i64) -> Result<QuizResponse, AppError> {
    sqlx::query_as::<_, QuizResponse>(&format!(
        "SELECT {} FROM quiz_responses WHERE id = $1",
        RESPONSE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Response not found".to_string()))
}

/// Whether the quiz is published to at least one group the student belongs to.
pub async fn student_can_see_quiz(pool: &PgPool, quiz_id: i64, student_id: i64) -> Result<bool, AppError> {
    let visible: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM quiz_publications p
            JOIN group_members m ON m.group_id = p.group_id
            JOIN quizzes q ON q.id = p.quiz_id
            WHERE p.quiz_id = $1
              AND m.student_id = $2
              AND p.status = 'published'
              AND q.status = 'published'
        )
        "#,
    )
    .bind(quiz_id)
    .bind(student_id)
    .fetch_one(pool)
    .await?;
    Ok(visible)
}

/// Whether any response to the quiz has been submitted; graded quizzes keep their questions.
pub async fn has_submissions(pool: &PgPool, quiz_id: i64) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM quiz_responses WHERE quiz_id = $1 AND status = 'submitted')",
    )
    .bind(quiz_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Who may read a response: its student, the quiz owner, or an admin.
pub async fn ensure_can_read_response(
    pool: &PgPool,
    response: &QuizResponse,
    claims: &Claims,
) -> Result<Quiz, AppError> {
    let quiz = load_quiz(pool, response.quiz_id).await?;
    let user_id = claims.user_id()?;
    if response.student_id == user_id || quiz.owner_id == user_id || claims.is_admin() {
        Ok(quiz)
    } else {
        Err(AppError::Forbidden("You cannot access this response".to_string()))
    }
}
