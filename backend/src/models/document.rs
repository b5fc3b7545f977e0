use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::config::MAX_DOCUMENT_BYTES;

/// Represents the 'documents' table: study material a quiz can be generated from.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Listing row, without the document body.
#[derive(Debug, Serialize, FromRow)]
pub struct DocumentSummary {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub size: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for uploading a document.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    #[validate(custom(function = validate_content))]
    pub content: String,
}

fn validate_content(content: &str) -> Result<(), validator::ValidationError> {
    if content.trim().is_empty() {
        return Err(validator::ValidationError::new("content_cannot_be_empty"));
    }
    if content.len() > MAX_DOCUMENT_BYTES {
        return Err(validator::ValidationError::new("document_too_large"));
    }
    Ok(())
}
