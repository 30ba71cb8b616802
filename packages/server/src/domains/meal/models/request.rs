use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

use super::status::RequestStatus;

/// A meal request.
///
/// Copies carry `original_request_id` pointing at the chain root, which
/// backs the one-pending-copy-per-chain guard.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MealRequest {
    pub id: i64,
    pub requester_id: Uuid,
    pub status_id: i32,
    pub meal_type_id: i32,
    pub request_time: DateTime<Utc>,
    pub notes: Option<String>,
    pub closed_by_id: Option<Uuid>,
    pub closed_time: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub original_request_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MealRequest {
    pub async fn find_by_id(id: i64, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM meal_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("MealRequest", id))
    }

    pub async fn insert(
        requester_id: Uuid,
        status: RequestStatus,
        meal_type_id: i32,
        notes: Option<&str>,
        original_request_id: Option<i64>,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        let now = clock::now();
        sqlx::query_as::<_, Self>(
            "INSERT INTO meal_requests (
                requester_id, status_id, meal_type_id, request_time, notes,
                is_deleted, original_request_id, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, false, $6, $4, $4)
             RETURNING *",
        )
        .bind(requester_id)
        .bind(status.id())
        .bind(meal_type_id)
        .bind(now)
        .bind(notes)
        .bind(original_request_id)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Lock the row for a state transition or deletion.
    pub async fn find_for_update(id: i64, conn: &mut PgConnection) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM meal_requests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(Into::into)
    }

    /// A pending copy of the given chain root for this requester, if one
    /// exists.
    pub async fn find_pending_copy(
        original_request_id: i64,
        requester_id: Uuid,
        pool: &PgPool,
    ) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM meal_requests
             WHERE original_request_id = $1
               AND requester_id = $2
               AND status_id = $3
               AND is_deleted = false
             LIMIT 1",
        )
        .bind(original_request_id)
        .bind(requester_id)
        .bind(RequestStatus::Pending.id())
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Status-only transition for the draft → pending hand-off; the closing
    /// fields stay untouched.
    pub async fn mark_pending(id: i64, conn: &mut PgConnection) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE meal_requests
             SET status_id = $2, updated_at = $3
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(RequestStatus::Pending.id())
        .bind(clock::now())
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    pub async fn set_status(
        id: i64,
        status: RequestStatus,
        closed_by: Option<Uuid>,
        conn: &mut PgConnection,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE meal_requests
             SET status_id = $2, closed_by_id = $3, closed_time = $4, updated_at = $4
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(status.id())
        .bind(closed_by)
        .bind(clock::now())
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// Per-status counts for the dashboard, optionally bounded by a date
    /// range.
    pub async fn stats(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        pool: &PgPool,
    ) -> AppResult<Vec<(i32, i64)>> {
        sqlx::query_as::<_, (i32, i64)>(
            "SELECT status_id, COUNT(*)
             FROM meal_requests
             WHERE is_deleted = false
               AND ($1::timestamptz IS NULL OR request_time >= $1)
               AND ($2::timestamptz IS NULL OR request_time <= $2)
             GROUP BY status_id
             ORDER BY status_id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
