use sqlx::PgPool;
use uuid::Uuid;

use crate::models::notice::{CreateNoticeRequest, Notice};
use crate::services::notifications::NotificationService;

const AUDIENCES: &[&str] = &["all", "parents", "drivers"];

pub struct NoticeService;

impl NoticeService {
    pub async fn list_active(pool: &PgPool) -> anyhow::Result<Vec<Notice>> {
        let notices = sqlx::query_as::<_, Notice>(
            "SELECT * FROM notices WHERE is_active = TRUE ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await?;
        Ok(notices)
    }

    pub async fn create(
        pool: &PgPool,
        notifications: &NotificationService,
        req: &CreateNoticeRequest,
        created_by: Uuid,
    ) -> anyhow::Result<Notice> {
        let audience = req.audience.as_deref().unwrap_or("all");
        anyhow::ensure!(AUDIENCES.contains(&audience), "Invalid audience: {audience}");

        let notice = sqlx::query_as::<_, Notice>(
            "INSERT INTO notices (title, body, audience, created_by)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&req.title)
        .bind(&req.body)
        .bind(audience)
        .bind(created_by)
        .fetch_one(pool)
        .await?;

        // Push failures never fail the post itself.
        if audience == "all" || audience == "parents" {
            let _ = notifications
                .notify_all_parents(pool, &notice.title, &notice.body, None)
                .await;
        }

        Ok(notice)
    }

    pub async fn deactivate(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE notices SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
