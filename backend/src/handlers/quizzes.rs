// src/handlers/quizzes.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    config::DEFAULT_GENERATED_QUESTIONS,
    error::AppError,
    handlers::documents::load_document,
    models::{
        question::CreateQuestionRequest,
        quiz::{
            CreateQuizRequest, Difficulty, GenerateQuizRequest, Quiz, QuizDetail, QuizStatus,
            UpdateQuizRequest,
        },
    },
    services::generator::generate_questions,
    state::AppState,
    utils::{
        access::{QUIZ_COLUMNS, load_owned_quiz, load_questions},
        html::{clean_html, clean_opt, clean_text},
        jwt::Claims,
    },
};

/// Inserts questions after the current last position of the quiz.
pub(crate) async fn insert_questions(
    conn: &mut PgConnection,
    quiz_id: i64,
    questions: &[CreateQuestionRequest],
) -> Result<Vec<i64>, AppError> {
    let next_position: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE quiz_id = $1",
    )
    .bind(quiz_id)
    .fetch_one(&mut *conn)
    .await?;

    let mut ids = Vec::with_capacity(questions.len());
    for (offset, q) in questions.iter().enumerate() {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO questions
            (quiz_id, position, type, content, options, answer, explanation, points, time_limit_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(quiz_id)
        .bind(next_position + offset as i32)
        .bind(q.question_type.as_str())
        .bind(clean_html(&q.content))
        .bind(sqlx::types::Json(&q.options))
        .bind(q.answer.trim())
        .bind(clean_opt(q.explanation.clone()))
        .bind(q.points.unwrap_or(1))
        .bind(q.time_limit_seconds)
        .fetch_one(&mut *conn)
        .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Creates a quiz, optionally with its questions, in draft state.
/// Teachers and admins only.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (owner_id, title, description, difficulty, time_limit_minutes, max_attempts)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(claims.user_id()?)
    .bind(clean_text(&payload.title))
    .bind(clean_opt(payload.description.clone()))
    .bind(payload.difficulty.unwrap_or(Difficulty::Medium).as_str())
    .bind(payload.time_limit_minutes)
    .bind(payload.max_attempts.unwrap_or(1))
    .fetch_one(&mut *tx)
    .await?;

    insert_questions(&mut tx, id, &payload.questions).await?;
    tx.commit().await?;

    tracing::info!(quiz_id = id, questions = payload.questions.len(), "Quiz created");

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Generates a draft quiz from an uploaded document.
///
/// Uses the configured AI backend, or the local generator when it is absent or fails.
pub async fn generate_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GenerateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let document = load_document(&state.pool, payload.document_id, &claims).await?;
    let difficulty = payload.difficulty.unwrap_or(Difficulty::Medium);
    let count = payload.num_questions.unwrap_or(DEFAULT_GENERATED_QUESTIONS);

    let generated = generate_questions(state.ai(), &document.content, count, difficulty).await?;

    let title = payload
        .title
        .clone()
        .unwrap_or_else(|| format!("Quiz: {}", document.filename));

    let mut tx = state.pool.begin().await?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (owner_id, title, difficulty, time_limit_minutes, source_document_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(claims.user_id()?)
    .bind(clean_text(&title))
    .bind(difficulty.as_str())
    .bind(payload.time_limit_minutes)
    .bind(document.id)
    .fetch_one(&mut *tx)
    .await?;

    insert_questions(&mut tx, id, &generated.questions).await?;
    tx.commit().await?;

    tracing::info!(
        quiz_id = id,
        document_id = document.id,
        questions = generated.questions.len(),
        source = ?generated.source,
        "Quiz generated"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "question_count": generated.questions.len(),
            "source": generated.source,
        })),
    ))
}

/// Lists the caller's quizzes (every quiz for admins).
pub async fn list_quizzes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, Quiz>(&format!(
        "SELECT {} FROM quizzes WHERE $1 OR owner_id = $2 ORDER BY updated_at DESC",
        QUIZ_COLUMNS
    ))
    .bind(claims.is_admin())
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

/// Full quiz with answer keys, for its author.
pub async fn get_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = load_owned_quiz(&pool, id, &claims).await?;
    let questions = load_questions(&pool, id).await?;
    Ok(Json(QuizDetail { quiz, questions }))
}

/// Updates quiz metadata. Publishing goes through the publish endpoint.
pub async fn update_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    load_owned_quiz(&pool, id, &claims).await?;

    if let Some(status) = payload.status {
        if !matches!(status, QuizStatus::Draft | QuizStatus::Archived) {
            return Err(AppError::BadRequest(
                "Use the publish endpoint to publish or schedule a quiz".to_string(),
            ));
        }
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE quizzes SET updated_at = NOW()");

    if let Some(title) = &payload.title {
        builder.push(", title = ");
        builder.push_bind(clean_text(title));
    }

    if let Some(description) = &payload.description {
        builder.push(", description = ");
        builder.push_bind(clean_html(description));
    }

    if let Some(difficulty) = payload.difficulty {
        builder.push(", difficulty = ");
        builder.push_bind(difficulty.as_str());
    }

    if let Some(limit) = payload.time_limit() {
        builder.push(", time_limit_minutes = ");
        builder.push_bind(limit);
    }

    if let Some(max_attempts) = payload.max_attempts {
        builder.push(", max_attempts = ");
        builder.push_bind(max_attempts);
    }

    if let Some(status) = payload.status {
        builder.push(", status = ");
        builder.push_bind(status.as_str());
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update quiz: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(StatusCode::OK)
}

/// Deletes a quiz with its questions, publications and responses.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_quiz(&pool, id, &claims).await?;

    sqlx::query("DELETE FROM quizzes WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
