// src/handlers/attempts.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::{Config, PASSING_PERCENTAGE},
    error::AppError,
    models::{
        quiz::{AvailableQuiz, PublicQuiz, Quiz},
        response::{
            HistoryEntry, InsightsParams, QuestionOutcome, QuizResponse, ResponseStatus,
            SaveAnswerRequest,
        },
    },
    services::{
        insights::generate_insights,
        scoring::score_answers,
        session::{Progress, Session, SessionView, deadline_for},
    },
    state::AppState,
    utils::{
        access::{
            RESPONSE_COLUMNS, ensure_can_read_response, load_questions, load_quiz, load_response,
            student_can_see_quiz,
        },
        jwt::Claims,
    },
};

/// Response row locked for the rest of the transaction.
async fn lock_response(
    conn: &mut sqlx::PgConnection,
    id: i64,
) -> Result<QuizResponse, AppError> {
    sqlx::query_as::<_, QuizResponse>(&format!(
        "SELECT {} FROM quiz_responses WHERE id = $1 FOR UPDATE",
        RESPONSE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Response not found".to_string()))
}

fn ensure_own_response(response: &QuizResponse, claims: &Claims) -> Result<(), AppError> {
    if response.student_id != claims.user_id()? {
        return Err(AppError::Forbidden("This is not your response".to_string()));
    }
    Ok(())
}

/// Quizzes published to any group the student belongs to.
pub async fn list_available(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = sqlx::query_as::<_, AvailableQuiz>(
        r#"
        SELECT
            q.id, q.title, q.description, q.difficulty, q.time_limit_minutes, q.max_attempts,
            (SELECT COUNT(*) FROM questions qq WHERE qq.quiz_id = q.id) AS question_count,
            (SELECT COUNT(*) FROM quiz_responses r
             WHERE r.quiz_id = q.id AND r.student_id = $1 AND r.status = 'submitted') AS attempts_used,
            q.published_at
        FROM quizzes q
        WHERE q.status = 'published'
          AND EXISTS (
              SELECT 1
              FROM quiz_publications p
              JOIN group_members m ON m.group_id = p.group_id
              WHERE p.quiz_id = q.id AND p.status = 'published' AND m.student_id = $1
          )
        ORDER BY q.published_at DESC NULLS LAST
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(quizzes))
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub response_id: i64,
    pub resumed: bool,
    pub quiz: PublicQuiz,
    pub session: SessionView,
}

fn public_quiz(quiz: &Quiz, session: &SessionView) -> PublicQuiz {
    PublicQuiz {
        id: quiz.id,
        title: quiz.title.clone(),
        description: quiz.description.clone(),
        difficulty: quiz.difficulty.clone(),
        time_limit_minutes: quiz.time_limit_minutes,
        questions: session.questions.clone(),
    }
}

/// Starts an attempt, or resumes the open one.
///
/// A new attempt is only created while the student has attempts left. Its
/// deadline is fixed at start time from the quiz's time limit.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let quiz = load_quiz(&pool, quiz_id).await?;

    if !student_can_see_quiz(&pool, quiz_id, student_id).await? {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let questions = load_questions(&pool, quiz_id).await?;
    if questions.is_empty() {
        return Err(AppError::BadRequest("Quiz has no questions".to_string()));
    }

    let open = sqlx::query_as::<_, QuizResponse>(&format!(
        "SELECT {} FROM quiz_responses WHERE quiz_id = $1 AND student_id = $2 AND status = 'in_progress'",
        RESPONSE_COLUMNS
    ))
    .bind(quiz_id)
    .bind(student_id)
    .fetch_optional(&pool)
    .await?;

    let (response, resumed) = match open {
        Some(response) => (response, true),
        None => {
            let used: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM quiz_responses WHERE quiz_id = $1 AND student_id = $2 AND status = 'submitted'",
            )
            .bind(quiz_id)
            .bind(student_id)
            .fetch_one(&pool)
            .await?;

            if used >= quiz.max_attempts as i64 {
                return Err(AppError::Conflict("No attempts left for this quiz".to_string()));
            }

            let now = Utc::now();
            let created = sqlx::query_as::<_, QuizResponse>(&format!(
                r#"
                INSERT INTO quiz_responses (quiz_id, student_id, started_at, deadline)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (quiz_id, student_id) WHERE status = 'in_progress' DO NOTHING
                RETURNING {}
                "#,
                RESPONSE_COLUMNS
            ))
            .bind(quiz_id)
            .bind(student_id)
            .bind(now)
            .bind(deadline_for(now, quiz.time_limit_minutes))
            .fetch_optional(&pool)
            .await?;

            match created {
                Some(response) => {
                    tracing::info!(response_id = response.id, quiz_id, student_id, "Attempt started");
                    (response, false)
                }
                // A concurrent start won the race; resume its attempt.
                None => (
                    sqlx::query_as::<_, QuizResponse>(&format!(
                        "SELECT {} FROM quiz_responses WHERE quiz_id = $1 AND student_id = $2 AND status = 'in_progress'",
                        RESPONSE_COLUMNS
                    ))
                    .bind(quiz_id)
                    .bind(student_id)
                    .fetch_one(&pool)
                    .await?,
                    true,
                ),
            }
        }
    };

    let session = Session::load(&response, &questions, config.submission_grace_secs);
    let view = session.view(&questions, Utc::now());
    let status = if resumed { StatusCode::OK } else { StatusCode::CREATED };

    Ok((
        status,
        Json(StartResponse {
            response_id: response.id,
            resumed,
            quiz: public_quiz(&quiz, &view),
            session: view,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct SaveAnswerResponse {
    pub progress: Progress,
    pub remaining_seconds: Option<i64>,
}

/// Records one answer of an open attempt.
pub async fn save_answer(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let response = lock_response(&mut tx, id).await?;
    ensure_own_response(&response, &claims)?;

    let questions = load_questions(&mut *tx, response.quiz_id).await?;
    let question = questions
        .iter()
        .find(|q| q.id == payload.question_id)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Question {} is not part of this quiz",
                payload.question_id
            ))
        })?;

    let now = Utc::now();
    let mut session = Session::load(&response, &questions, config.submission_grace_secs);
    session.save_answer(question, &payload, now)?;

    let reply = SaveAnswerResponse {
        progress: session.progress(),
        remaining_seconds: session.remaining_seconds(now),
    };

    sqlx::query("UPDATE quiz_responses SET answers = $1 WHERE id = $2 AND status = 'in_progress'")
        .bind(SqlJson(session.into_entries()))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(reply))
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub response_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub correct_count: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub passed: bool,
    /// True when this request only replayed an earlier submission.
    pub already_submitted: bool,
    pub submitted_at: Option<chrono::DateTime<Utc>>,
    pub results: Vec<QuestionOutcome>,
}

impl SubmitResponse {
    fn from_stored(response: QuizResponse, already_submitted: bool) -> Self {
        let percentage = response.percentage.unwrap_or(0.0);
        Self {
            response_id: response.id,
            score: response.score.unwrap_or(0),
            max_score: response.max_score.unwrap_or(0),
            correct_count: response.correct_count.unwrap_or(0),
            total_questions: response.total_questions.unwrap_or(0),
            percentage,
            passed: percentage >= PASSING_PERCENTAGE,
            already_submitted,
            submitted_at: response.submitted_at,
            results: response.results.map(|r| r.0).unwrap_or_default(),
        }
    }
}

/// Grades and closes an attempt. Unanswered questions count as wrong.
///
/// Idempotent: the row is locked and the status flip is conditional, so a
/// retried or duplicated request gets the stored result and the attempt is
/// scored once.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;
    let response = lock_response(&mut tx, id).await?;
    ensure_own_response(&response, &claims)?;

    if response.status() == ResponseStatus::Submitted {
        tx.commit().await?;
        return Ok(Json(SubmitResponse::from_stored(response, true)));
    }

    let questions = load_questions(&mut *tx, response.quiz_id).await?;
    let entries = Session::load(&response, &questions, config.submission_grace_secs).into_entries();
    let card = score_answers(&questions, &entries);

    let stored = sqlx::query_as::<_, QuizResponse>(&format!(
        r#"
        UPDATE quiz_responses
        SET status = 'submitted',
            submitted_at = NOW(),
            answers = $1,
            score = $2,
            max_score = $3,
            correct_count = $4,
            total_questions = $5,
            percentage = $6,
            results = $7
        WHERE id = $8 AND status = 'in_progress'
        RETURNING {}
        "#,
        RESPONSE_COLUMNS
    ))
    .bind(SqlJson(&entries))
    .bind(card.score)
    .bind(card.max_score)
    .bind(card.correct_count)
    .bind(card.total_questions)
    .bind(card.percentage)
    .bind(SqlJson(&card.outcomes))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    tx.commit().await?;

    match stored {
        Some(stored) => {
            tracing::info!(
                response_id = id,
                quiz_id = stored.quiz_id,
                score = card.score,
                percentage = card.percentage,
                "Response submitted"
            );
            Ok(Json(SubmitResponse::from_stored(stored, false)))
        }
        None => Ok(Json(SubmitResponse::from_stored(load_response(&pool, id).await?, true))),
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseDetail {
    #[serde(flatten)]
    pub response: QuizResponse,
    pub passed: Option<bool>,
    /// Live session state while the attempt is open.
    pub session: Option<SessionView>,
}

/// One response, for its student, the quiz owner or an admin.
pub async fn get_response(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let response = load_response(&pool, id).await?;
    ensure_can_read_response(&pool, &response, &claims).await?;

    let session = if response.status() == ResponseStatus::InProgress {
        let questions = load_questions(&pool, response.quiz_id).await?;
        Some(Session::load(&response, &questions, config.submission_grace_secs).view(&questions, Utc::now()))
    } else {
        None
    };

    Ok(Json(ResponseDetail {
        passed: response.percentage.map(|p| p >= PASSING_PERCENTAGE),
        response,
        session,
    }))
}

/// The student's own attempts, newest first.
pub async fn list_history(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let history = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT r.id, r.quiz_id, q.title AS quiz_title, r.status, r.score, r.max_score,
               r.percentage, r.started_at, r.submitted_at
        FROM quiz_responses r
        JOIN quizzes q ON q.id = r.quiz_id
        WHERE r.student_id = $1
        ORDER BY r.started_at DESC
        "#,
    )
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(history))
}

/// Generates (or returns cached) feedback for a submitted response.
pub async fn request_insights(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Query(params): Query<InsightsParams>,
) -> Result<impl IntoResponse, AppError> {
    let response = load_response(&state.pool, id).await?;
    let quiz = ensure_can_read_response(&state.pool, &response, &claims).await?;

    if response.status() != ResponseStatus::Submitted {
        return Err(AppError::Conflict(
            "Insights are available once the response is submitted".to_string(),
        ));
    }

    if let (Some(text), false) = (&response.insights, params.refresh) {
        return Ok(Json(serde_json::json!({
            "insights": text,
            "source": response.insights_source,
            "generated_at": response.insights_generated_at,
            "cached": true,
        })));
    }

    let questions = load_questions(&state.pool, response.quiz_id).await?;
    let insights = generate_insights(state.ai(), &quiz, &questions, &response).await?;

    let generated_at: chrono::DateTime<Utc> = sqlx::query_scalar(
        r#"
        UPDATE quiz_responses
        SET insights = $1, insights_source = $2, insights_generated_at = NOW()
        WHERE id = $3
        RETURNING insights_generated_at
        "#,
    )
    .bind(&insights.text)
    .bind(insights.source.as_str())
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(response_id = id, source = insights.source.as_str(), "Insights generated");

    Ok(Json(serde_json::json!({
        "insights": insights.text,
        "source": insights.source,
        "generated_at": generated_at,
        "cached": false,
    })))
}
