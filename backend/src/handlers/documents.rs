use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::document::{CreateDocumentRequest, Document, DocumentSummary},
    utils::{access::ensure_owner, jwt::Claims},
};

/// Uploads a document (plain text) for later quiz generation.
/// Teachers and admins only.
pub async fn create_document(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO documents (owner_id, filename, content) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(claims.user_id()?)
    .bind(payload.filename.trim())
    .bind(&payload.content)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store document: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(document_id = id, bytes = payload.content.len(), "Document uploaded");

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Lists the caller's documents (all documents for admins), without bodies.
pub async fn list_documents(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let documents = sqlx::query_as::<_, DocumentSummary>(
        r#"
        SELECT id, owner_id, filename, octet_length(content) AS size, created_at
        FROM documents
        WHERE $1 OR owner_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(claims.is_admin())
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(documents))
}

pub async fn load_document(pool: &PgPool, id: i64, claims: &Claims) -> Result<Document, AppError> {
    let document = sqlx::query_as::<_, Document>(
        "SELECT id, owner_id, filename, content, created_at FROM documents WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Document not found".to_string()))?;

    ensure_owner(claims, document.owner_id, "document")?;
    Ok(document)
}

pub async fn get_document(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(load_document(&pool, id, &claims).await?))
}

pub async fn delete_document(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_document(&pool, id, &claims).await?;

    sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
