use std::collections::HashSet;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    handlers::quizzes::insert_questions,
    models::{
        question::{CreateQuestionRequest, Question, UpdateQuestionRequest, check_shape},
        quiz::ReorderQuestionsRequest,
    },
    utils::{
        access::{QUESTION_COLUMNS, has_submissions, load_owned_quiz, load_questions},
        html::{clean_html, clean_opt},
        jwt::Claims,
    },
};

/// Refuses edits once students have been graded against the quiz.
async fn ensure_editable(pool: &PgPool, quiz_id: i64) -> Result<(), AppError> {
    if has_submissions(pool, quiz_id).await? {
        return Err(AppError::Conflict(
            "Questions cannot change after responses have been submitted".to_string(),
        ));
    }
    Ok(())
}

/// Loads a question together with an ownership check on its quiz.
async fn load_owned_question(pool: &PgPool, id: i64, claims: &Claims) -> Result<Question, AppError> {
    let question = sqlx::query_as::<_, Question>(&format!(
        "SELECT {} FROM questions WHERE id = $1",
        QUESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    load_owned_quiz(pool, question.quiz_id, claims).await?;
    Ok(question)
}

/// Appends a question to a quiz.
pub async fn create_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    load_owned_quiz(&pool, quiz_id, &claims).await?;
    ensure_editable(&pool, quiz_id).await?;

    let mut tx = pool.begin().await?;
    let ids = insert_questions(&mut tx, quiz_id, std::slice::from_ref(&payload)).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": ids[0]}))))
}

/// Updates a question. The resulting type, options and answer must stay consistent.
pub async fn update_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let current = load_owned_question(&pool, id, &claims).await?;
    ensure_editable(&pool, current.quiz_id).await?;

    let question_type = payload.question_type.unwrap_or_else(|| current.kind());
    let options = payload.options.clone().unwrap_or_else(|| current.options.0.clone());
    let answer = payload.answer.clone().unwrap_or_else(|| current.answer.clone());
    check_shape(question_type, &options, &answer).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
    let mut separated = builder.separated(", ");

    separated.push("type = ");
    separated.push_bind_unseparated(question_type.as_str());
    separated.push("options = ");
    separated.push_bind_unseparated(sqlx::types::Json(options));
    separated.push("answer = ");
    separated.push_bind_unseparated(answer.trim().to_string());

    if let Some(content) = &payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(clean_html(content));
    }

    if let Some(explanation) = payload.explanation.clone() {
        separated.push("explanation = ");
        separated.push_bind_unseparated(clean_opt(Some(explanation)));
    }

    if let Some(points) = payload.points {
        separated.push("points = ");
        separated.push_bind_unseparated(points);
    }

    if let Some(seconds) = payload.time_limit_seconds {
        separated.push("time_limit_seconds = ");
        separated.push_bind_unseparated(seconds);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a question and closes the gap in positions.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = load_owned_question(&pool, id, &claims).await?;
    ensure_editable(&pool, question.quiz_id).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE questions SET position = position - 1 WHERE quiz_id = $1 AND position > $2")
        .bind(question.quiz_id)
        .bind(question.position)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Whether `requested` lists exactly the quiz's questions, each once.
pub fn is_permutation(existing: &[i64], requested: &[i64]) -> bool {
    let wanted: HashSet<i64> = existing.iter().copied().collect();
    let mut seen = HashSet::new();
    requested.len() == existing.len()
        && requested.iter().all(|id| wanted.contains(id) && seen.insert(*id))
}

/// Reorders the questions of a quiz.
pub async fn reorder_questions(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<ReorderQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_quiz(&pool, quiz_id, &claims).await?;

    let existing: Vec<i64> = load_questions(&pool, quiz_id)
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect();

    if !is_permutation(&existing, &payload.question_ids) {
        return Err(AppError::BadRequest(
            "question_ids must list every question of the quiz exactly once".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    for (position, id) in payload.question_ids.iter().enumerate() {
        sqlx::query("UPDATE questions SET position = $1 WHERE id = $2 AND quiz_id = $3")
            .bind(position as i32)
            .bind(id)
            .bind(quiz_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[1, 2, 3], &[3, 1, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 2, 2]));
        assert!(!is_permutation(&[1, 2, 3], &[1, 2, 4]));
        assert!(is_permutation(&[], &[]));
    }
}
