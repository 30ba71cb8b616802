//! Execution history rows.
//!
//! Lifecycle: `pending → running → (success | failed)`. Manual triggers may
//! enter directly at `running`. Periodic firings that lose the lock race
//! never persist a row at all.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

use super::lookup::ExecutionStatusCode;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ScheduledJobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub execution_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status_id: i32,
    pub error_message: Option<String>,
    pub error_traceback: Option<String>,
    pub result_summary: Option<String>,
    pub executor_id: Option<String>,
    pub host_name: Option<String>,
    pub triggered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJobExecution {
    #[allow(clippy::too_many_arguments)]
    pub fn running(
        job_id: Uuid,
        execution_id: Uuid,
        scheduled_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        executor_id: &str,
        host_name: &str,
        triggered_by: Option<Uuid>,
    ) -> Self {
        Self {
            id: clock::db_id(),
            job_id,
            execution_id,
            scheduled_at,
            started_at,
            completed_at: None,
            duration_ms: None,
            status_id: ExecutionStatusCode::Running.id(),
            error_message: None,
            error_traceback: None,
            result_summary: None,
            executor_id: Some(executor_id.to_string()),
            host_name: Some(host_name.to_string()),
            triggered_by,
            created_at: clock::now(),
        }
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO scheduled_job_executions (
                id, job_id, execution_id, scheduled_at, started_at, completed_at,
                duration_ms, status_id, error_message, error_traceback,
                result_summary, executor_id, host_name, triggered_by, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.job_id)
        .bind(self.execution_id)
        .bind(self.scheduled_at)
        .bind(self.started_at)
        .bind(self.completed_at)
        .bind(self.duration_ms)
        .bind(self.status_id)
        .bind(&self.error_message)
        .bind(&self.error_traceback)
        .bind(&self.result_summary)
        .bind(&self.executor_id)
        .bind(&self.host_name)
        .bind(self.triggered_by)
        .bind(self.created_at)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_execution_id(execution_id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_job_executions WHERE execution_id = $1",
        )
        .bind(execution_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("ScheduledJobExecution", execution_id))
    }

    /// The newest execution still pending or running, if any. Backs the
    /// manual duplicate-trigger guard.
    pub async fn find_in_flight(job_id: Uuid, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_job_executions
             WHERE job_id = $1 AND status_id IN ($2, $3)
             ORDER BY scheduled_at DESC
             LIMIT 1",
        )
        .bind(job_id)
        .bind(ExecutionStatusCode::Pending.id())
        .bind(ExecutionStatusCode::Running.id())
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn count_running(job_id: Uuid, pool: &PgPool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scheduled_job_executions
             WHERE job_id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(ExecutionStatusCode::Running.id())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Write the terminal state. `started_at` is backfilled for executions
    /// that went straight to dispatch, and `duration_ms` derives from it.
    pub async fn complete(
        execution_id: Uuid,
        status: ExecutionStatusCode,
        result_summary: Option<&str>,
        error_message: Option<&str>,
        error_traceback: Option<&str>,
        pool: &PgPool,
    ) -> AppResult<Self> {
        let completed_at = clock::now();
        sqlx::query_as::<_, Self>(
            "UPDATE scheduled_job_executions
             SET started_at = COALESCE(started_at, $2),
                 completed_at = $2,
                 duration_ms = (EXTRACT(EPOCH FROM ($2 - COALESCE(started_at, $2))) * 1000)::bigint,
                 status_id = $3,
                 result_summary = $4,
                 error_message = $5,
                 error_traceback = $6
             WHERE execution_id = $1
             RETURNING *",
        )
        .bind(execution_id)
        .bind(completed_at)
        .bind(status.id())
        .bind(result_summary)
        .bind(error_message)
        .bind(error_traceback)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("ScheduledJobExecution", execution_id))
    }

    /// Append to `result_summary` without touching status; used when an
    /// execution is handed off to the external queue.
    pub async fn append_summary(execution_id: Uuid, note: &str, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "UPDATE scheduled_job_executions
             SET result_summary = COALESCE(result_summary || ' | ', '') || $2
             WHERE execution_id = $1",
        )
        .bind(execution_id)
        .bind(note)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// History for one job, newest scheduled first.
    pub async fn history_for_job(job_id: Uuid, limit: i64, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_job_executions
             WHERE job_id = $1
             ORDER BY scheduled_at DESC
             LIMIT $2",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn all_history(limit: i64, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_job_executions
             ORDER BY scheduled_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Drop terminal executions older than the retention window.
    pub async fn cleanup_older_than(days: i64, pool: &PgPool) -> AppResult<u64> {
        let cutoff = clock::now() - chrono::Duration::days(days);
        let deleted = sqlx::query(
            "DELETE FROM scheduled_job_executions
             WHERE scheduled_at < $1 AND status_id IN ($2, $3)",
        )
        .bind(cutoff)
        .bind(ExecutionStatusCode::Success.id())
        .bind(ExecutionStatusCode::Failed.id())
        .execute(pool)
        .await?
        .rows_affected();
        Ok(deleted)
    }
}
