// src/services/publisher.rs

use std::time::Duration;

use sqlx::{FromRow, PgPool};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::AppError;

/// A publication activated by one tick of the job.
#[derive(Debug, FromRow)]
pub struct Activated {
    pub id: i64,
    pub quiz_id: i64,
    pub group_id: i64,
}

/// Background job that turns due scheduled publications into published ones.
pub struct Publisher {
    pool: PgPool,
    interval: Duration,
}

impl Publisher {
    pub fn new(pool: PgPool, interval_secs: u64) -> Self {
        Self {
            pool,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    pub async fn run(self) {
        info!(
            "Starting scheduled publishing loop (interval {}s)",
            self.interval.as_secs()
        );

        loop {
            match activate_due(&self.pool).await {
                Ok(activated) if !activated.is_empty() => {
                    for a in &activated {
                        info!(
                            publication_id = a.id,
                            quiz_id = a.quiz_id,
                            group_id = a.group_id,
                            "Scheduled publication activated"
                        );
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Scheduled publishing tick failed"),
            }

            sleep(self.interval).await;
        }
    }
}

/// Activates every scheduled publication whose time has come.
///
/// The status flip is conditional on the row still being 'scheduled', so a
/// publication is activated once even when ticks or instances overlap. The
/// quiz status follows in the same transaction.
pub async fn activate_due(pool: &PgPool) -> Result<Vec<Activated>, AppError> {
    let mut tx = pool.begin().await?;

    let activated: Vec<Activated> = sqlx::query_as(
        r#"
        UPDATE quiz_publications
        SET status = 'published', published_at = NOW()
        WHERE status = 'scheduled' AND scheduled_at <= NOW()
        RETURNING id, quiz_id, group_id
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    if !activated.is_empty() {
        let mut quiz_ids: Vec<i64> = activated.iter().map(|a| a.quiz_id).collect();
        quiz_ids.sort_unstable();
        quiz_ids.dedup();

        sqlx::query(
            r#"
            UPDATE quizzes
            SET status = 'published',
                published_at = COALESCE(published_at, NOW()),
                updated_at = NOW()
            WHERE id = ANY($1) AND status <> 'archived'
            "#,
        )
        .bind(&quiz_ids)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(activated)
}
