// src/handlers/analytics.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        response::{LeaderboardEntry, QuizResponse, ResponseSummary},
        user::Role,
    },
    services::analytics::{summarize_quiz, summarize_student},
    utils::{
        access::{RESPONSE_COLUMNS, load_owned_quiz, load_questions, load_quiz, student_can_see_quiz},
        jwt::Claims,
    },
};

const LEADERBOARD_SIZE: i64 = 10;

/// Aggregated results of a quiz for its author.
pub async fn quiz_analytics(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_quiz(&pool, quiz_id, &claims).await?;
    let questions = load_questions(&pool, quiz_id).await?;

    let responses = sqlx::query_as::<_, QuizResponse>(&format!(
        "SELECT {} FROM quiz_responses WHERE quiz_id = $1 AND status = 'submitted'",
        RESPONSE_COLUMNS
    ))
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(summarize_quiz(quiz_id, &questions, &responses)))
}

/// Submitted responses to a quiz with the students' usernames.
pub async fn quiz_responses(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_quiz(&pool, quiz_id, &claims).await?;

    let responses = sqlx::query_as::<_, ResponseSummary>(
        r#"
        SELECT r.id, r.quiz_id, r.student_id, u.username, r.status, r.score, r.max_score,
               r.percentage, r.started_at, r.submitted_at
        FROM quiz_responses r
        JOIN users u ON u.id = r.student_id
        WHERE r.quiz_id = $1 AND r.status = 'submitted'
        ORDER BY r.submitted_at DESC
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(responses))
}

/// Best submitted attempt per student, highest first; ties go to the earlier submission.
pub async fn leaderboard(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if claims.role() == Role::Student {
        load_quiz(&pool, quiz_id).await?;
        if !student_can_see_quiz(&pool, quiz_id, claims.user_id()?).await? {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        }
    } else {
        load_owned_quiz(&pool, quiz_id, &claims).await?;
    }

    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT username, percentage, score, submitted_at
        FROM (
            SELECT DISTINCT ON (r.student_id)
                   u.username,
                   COALESCE(r.percentage, 0) AS percentage,
                   COALESCE(r.score, 0) AS score,
                   r.submitted_at
            FROM quiz_responses r
            JOIN users u ON u.id = r.student_id
            WHERE r.quiz_id = $1 AND r.status = 'submitted'
            ORDER BY r.student_id, r.percentage DESC, r.submitted_at ASC
        ) best
        ORDER BY percentage DESC, submitted_at ASC
        LIMIT $2
        "#,
    )
    .bind(quiz_id)
    .bind(LEADERBOARD_SIZE)
    .fetch_all(&pool)
    .await?;

    Ok(Json(entries))
}

/// The calling student's performance across submitted quizzes.
pub async fn student_analytics(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts: Vec<(i64, f64)> = sqlx::query_as(
        r#"
        SELECT quiz_id, COALESCE(percentage, 0)
        FROM quiz_responses
        WHERE student_id = $1 AND status = 'submitted'
        ORDER BY submitted_at
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(summarize_student(&attempts)))
}
