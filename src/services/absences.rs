use sqlx::PgPool;
use uuid::Uuid;

use crate::models::absence::{AbsenceRequest, CreateAbsenceRequest, RequestStatus};

pub struct AbsenceService;

impl AbsenceService {
    /// Create a request. The date range is validated here, at the store
    /// boundary — roster logic downstream assumes ranges are well formed.
    pub async fn create(
        pool: &PgPool,
        req: &CreateAbsenceRequest,
        created_by: Uuid,
    ) -> anyhow::Result<AbsenceRequest> {
        if let Some(end) = req.date_end {
            anyhow::ensure!(
                end >= req.date_start,
                "date_end must be the same day as date_start or later"
            );
        }

        let request = sqlx::query_as::<_, AbsenceRequest>(
            "INSERT INTO absence_requests
                 (student_id, kind, date_start, date_end, pickup_time, change_type, note, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(req.student_id)
        .bind(req.kind.to_string())
        .bind(req.date_start)
        .bind(req.date_end)
        .bind(req.pickup_time)
        .bind(&req.change_type)
        .bind(&req.note)
        .bind(created_by)
        .fetch_one(pool)
        .await?;
        Ok(request)
    }

    pub async fn list_pending(pool: &PgPool) -> anyhow::Result<Vec<AbsenceRequest>> {
        let requests = sqlx::query_as::<_, AbsenceRequest>(
            "SELECT * FROM absence_requests WHERE status = 'pending' ORDER BY date_start, created_at",
        )
        .fetch_all(pool)
        .await?;
        Ok(requests)
    }

    pub async fn list_for_parent(pool: &PgPool, parent_id: Uuid) -> anyhow::Result<Vec<AbsenceRequest>> {
        let requests = sqlx::query_as::<_, AbsenceRequest>(
            "SELECT ar.* FROM absence_requests ar
             JOIN student_parents sp ON sp.student_id = ar.student_id
             WHERE sp.user_id = $1
             ORDER BY ar.created_at DESC",
        )
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(requests)
    }

    /// Approve or reject. Either way the request leaves the pending set the
    /// roster assembler reads.
    pub async fn review(pool: &PgPool, id: Uuid, approve: bool) -> anyhow::Result<AbsenceRequest> {
        let status = if approve {
            RequestStatus::Approved
        } else {
            RequestStatus::Rejected
        };
        let request = sqlx::query_as::<_, AbsenceRequest>(
            "UPDATE absence_requests SET status = $1 WHERE id = $2 AND status = 'pending' RETURNING *",
        )
        .bind(status.to_string())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Request not found or already reviewed"))?;
        Ok(request)
    }
}
