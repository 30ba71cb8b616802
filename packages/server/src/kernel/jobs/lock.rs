//! Lease-based job locks.
//!
//! At most one unreleased, unexpired lock may exist per `job_id`.
//! Acquisition is a single conditional insert: the `NOT EXISTS` predicate
//! plus the (job_id, execution_id) unique constraint make the race resolve
//! to exactly one winner; losers see no row come back.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult, DbErrorKind};

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ScheduledJobLock {
    pub id: Uuid,
    pub job_id: Uuid,
    pub execution_id: Uuid,
    pub executor_id: String,
    pub host_name: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl ScheduledJobLock {
    /// Try to take the lease for `job_id`. Returns `None` when another
    /// holder is active.
    pub async fn acquire(
        job_id: Uuid,
        execution_id: Uuid,
        executor_id: &str,
        host_name: &str,
        ttl_seconds: i64,
        conn: &mut PgConnection,
    ) -> AppResult<Option<Self>> {
        let now = clock::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds);

        let result = sqlx::query_as::<_, Self>(
            "INSERT INTO scheduled_job_locks (
                id, job_id, execution_id, executor_id, host_name, acquired_at, expires_at
             )
             SELECT $1, $2, $3, $4, $5, $6, $7
             WHERE NOT EXISTS (
                 SELECT 1 FROM scheduled_job_locks
                 WHERE job_id = $2 AND released_at IS NULL AND expires_at > $6
             )
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(job_id)
        .bind(execution_id)
        .bind(executor_id)
        .bind(host_name)
        .bind(now)
        .bind(expires_at)
        .fetch_optional(&mut *conn)
        .await;

        match result {
            Ok(lock) => Ok(lock),
            Err(e) => {
                let app_err = AppError::from(e);
                if app_err.db_kind() == Some(DbErrorKind::UniqueViolation) {
                    Ok(None)
                } else {
                    Err(app_err)
                }
            }
        }
    }

    /// Release the lease held by `execution_id`. Returns false when it was
    /// already released.
    pub async fn release(job_id: Uuid, execution_id: Uuid, pool: &PgPool) -> AppResult<bool> {
        let released = sqlx::query(
            "UPDATE scheduled_job_locks
             SET released_at = $3
             WHERE job_id = $1 AND execution_id = $2 AND released_at IS NULL",
        )
        .bind(job_id)
        .bind(execution_id)
        .bind(clock::now())
        .execute(pool)
        .await?
        .rows_affected();
        Ok(released > 0)
    }

    /// The currently active lock for a job, if any.
    pub async fn active_for_job(job_id: Uuid, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_job_locks
             WHERE job_id = $1 AND released_at IS NULL AND expires_at > $2
             LIMIT 1",
        )
        .bind(job_id)
        .bind(clock::now())
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Release leases whose TTL lapsed without a release. Safe: the holding
    /// instance is either dead or its execution has already finished.
    pub async fn release_expired(pool: &PgPool) -> AppResult<u64> {
        let now = clock::now();
        let released = sqlx::query(
            "UPDATE scheduled_job_locks
             SET released_at = $1
             WHERE released_at IS NULL AND expires_at < $1",
        )
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(released)
    }
}
