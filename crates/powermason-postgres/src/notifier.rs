//! Notifications persisted to `powermason.notifications`.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use powermason_core::error::Result;
use powermason_core::ports::Notifier;
use powermason_core::types::{Notification, UserId};

#[derive(Debug, sqlx::FromRow)]
struct PgNotificationRow {
    user_id: i64,
    message: String,
    link: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PgNotificationRow> for Notification {
    fn from(r: PgNotificationRow) -> Self {
        Notification {
            user_id: r.user_id,
            message: r.message,
            link: r.link,
            created_at: r.created_at,
        }
    }
}

pub struct PgNotifier {
    pool: PgPool,
}

impl PgNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Newest first.
    pub async fn notifications_for(&self, user: UserId) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, PgNotificationRow>(
            r#"
            SELECT user_id, message, link, created_at
            FROM powermason.notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, user: UserId, message: &str, link: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO powermason.notifications (user_id, message, link) VALUES ($1, $2, $3)",
        )
        .bind(user)
        .bind(message)
        .bind(link)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        tracing::debug!(user_id = user, "notification stored");
        Ok(())
    }
}
