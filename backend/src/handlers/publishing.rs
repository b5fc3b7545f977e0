// src/handlers/publishing.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        publication::{Publication, PublicationStatus, PublishRequest},
        quiz::QuizStatus,
    },
    utils::{
        access::{load_owned_group, load_owned_quiz, load_questions},
        jwt::Claims,
    },
};

const PUBLICATION_COLUMNS: &str =
    "id, quiz_id, group_id, status, scheduled_at, published_at, created_by, created_at";

/// Publishes a quiz to groups now, or schedules it for `scheduled_at`.
///
/// One publication row exists per quiz/group pair; publishing again replaces
/// its schedule but never withdraws a group that already has the quiz. The
/// publisher job activates scheduled rows when they are due.
pub async fn publish_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let quiz = load_owned_quiz(&pool, quiz_id, &claims).await?;

    if quiz.status() == QuizStatus::Archived {
        return Err(AppError::Conflict("Archived quizzes cannot be published".to_string()));
    }
    if load_questions(&pool, quiz_id).await?.is_empty() {
        return Err(AppError::BadRequest("Quiz has no questions".to_string()));
    }

    let mut group_ids = payload.group_ids.clone();
    group_ids.sort_unstable();
    group_ids.dedup();
    for group_id in &group_ids {
        load_owned_group(&pool, *group_id, &claims).await?;
    }

    let now = Utc::now();
    let status = PublicationStatus::initial(payload.scheduled_at, now);
    let immediate = status == PublicationStatus::Published;
    let user_id = claims.user_id()?;

    let mut tx = pool.begin().await?;
    let mut publications = Vec::with_capacity(group_ids.len());

    for group_id in &group_ids {
        let publication = sqlx::query_as::<_, Publication>(&format!(
            r#"
            INSERT INTO quiz_publications (quiz_id, group_id, status, scheduled_at, published_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (quiz_id, group_id) DO UPDATE SET
                status = CASE WHEN quiz_publications.status = 'published'
                              THEN 'published' ELSE EXCLUDED.status END,
                scheduled_at = EXCLUDED.scheduled_at,
                published_at = COALESCE(quiz_publications.published_at, EXCLUDED.published_at),
                created_by = EXCLUDED.created_by
            RETURNING {}
            "#,
            PUBLICATION_COLUMNS
        ))
        .bind(quiz_id)
        .bind(group_id)
        .bind(status.as_str())
        .bind(payload.scheduled_at)
        .bind(immediate.then_some(now))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        publications.push(publication);
    }

    let next = quiz.status().after_publication(immediate);
    sqlx::query(
        r#"
        UPDATE quizzes
        SET status = $1,
            published_at = CASE WHEN $2 THEN COALESCE(published_at, NOW()) ELSE published_at END,
            updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(next.as_str())
    .bind(immediate)
    .bind(quiz_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        quiz_id,
        groups = group_ids.len(),
        status = status.as_str(),
        scheduled_at = ?payload.scheduled_at,
        "Quiz publication recorded"
    );

    Ok(Json(serde_json::json!({
        "quiz_status": next,
        "publications": publications,
    })))
}

pub async fn list_publications(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_quiz(&pool, quiz_id, &claims).await?;

    let publications = sqlx::query_as::<_, Publication>(&format!(
        "SELECT {} FROM quiz_publications WHERE quiz_id = $1 ORDER BY created_at",
        PUBLICATION_COLUMNS
    ))
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(publications))
}

/// Cancels a publication that is still scheduled.
pub async fn cancel_publication(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let publication = sqlx::query_as::<_, Publication>(&format!(
        "SELECT {} FROM quiz_publications WHERE id = $1",
        PUBLICATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Publication not found".to_string()))?;

    load_owned_quiz(&pool, publication.quiz_id, &claims).await?;

    let status: PublicationStatus = publication
        .status
        .parse()
        .map_err(AppError::InternalServerError)?;
    if !status.can_cancel() {
        return Err(AppError::Conflict(format!(
            "Publication is already {}",
            status.as_str()
        )));
    }

    // Conditional on the status so a concurrent activation wins cleanly.
    let result = sqlx::query(
        "UPDATE quiz_publications SET status = 'cancelled' WHERE id = $1 AND status = 'scheduled'",
    )
    .bind(id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Publication is already published".to_string()));
    }

    // A quiz left with no live publication falls back to draft.
    sqlx::query(
        r#"
        UPDATE quizzes SET status = 'draft', updated_at = NOW()
        WHERE id = $1 AND status = 'scheduled'
          AND NOT EXISTS (
              SELECT 1 FROM quiz_publications
              WHERE quiz_id = $1 AND status IN ('scheduled', 'published')
          )
        "#,
    )
    .bind(publication.quiz_id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
