// src/models/publication.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quiz_publications' table: a quiz made available to one group.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Publication {
    pub id: i64,
    pub quiz_id: i64,
    pub group_id: i64,

    /// 'scheduled', 'published' or 'cancelled'.
    pub status: String,

    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    Scheduled,
    Published,
    Cancelled,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Scheduled => "scheduled",
            PublicationStatus::Published => "published",
            PublicationStatus::Cancelled => "cancelled",
        }
    }

    /// Initial status of a publication requested at `now` for `scheduled_at`.
    pub fn initial(scheduled_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match scheduled_at {
            Some(at) if at > now => PublicationStatus::Scheduled,
            _ => PublicationStatus::Published,
        }
    }

    /// Only a pending schedule can be cancelled.
    pub fn can_cancel(self) -> bool {
        self == PublicationStatus::Scheduled
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(PublicationStatus::Scheduled),
            "published" => Ok(PublicationStatus::Published),
            "cancelled" => Ok(PublicationStatus::Cancelled),
            other => Err(format!("Unknown publication status '{}'", other)),
        }
    }
}

/// DTO for publishing a quiz to groups, now or at `scheduled_at`.
#[derive(Debug, Deserialize, Validate)]
pub struct PublishRequest {
    #[validate(length(min = 1, max = 100))]
    pub group_ids: Vec<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_initial_status() {
        let now = Utc::now();
        assert_eq!(
            PublicationStatus::initial(None, now),
            PublicationStatus::Published
        );
        assert_eq!(
            PublicationStatus::initial(Some(now - Duration::minutes(5)), now),
            PublicationStatus::Published
        );
        assert_eq!(
            PublicationStatus::initial(Some(now), now),
            PublicationStatus::Published
        );
        assert_eq!(
            PublicationStatus::initial(Some(now + Duration::minutes(5)), now),
            PublicationStatus::Scheduled
        );
    }

    #[test]
    fn test_only_scheduled_can_be_cancelled() {
        assert!(PublicationStatus::Scheduled.can_cancel());
        assert!(!PublicationStatus::Published.can_cancel());
        assert!(!PublicationStatus::Cancelled.can_cancel());
    }
}
