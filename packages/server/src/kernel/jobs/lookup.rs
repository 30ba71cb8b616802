//! Scheduler lookup tables and their canonical codes.
//!
//! Job types, execution statuses and the built-in task functions are seeded
//! idempotently at startup; jobs reference task functions by foreign key and
//! become unschedulable when their task function is inactive.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

/// Wire-stable job type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTypeCode {
    Interval,
    Cron,
}

impl JobTypeCode {
    pub fn id(self) -> i32 {
        match self {
            Self::Interval => 1,
            Self::Cron => 2,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Cron => "cron",
        }
    }

    pub fn from_id(id: i32) -> AppResult<Self> {
        match id {
            1 => Ok(Self::Interval),
            2 => Ok(Self::Cron),
            other => Err(AppError::validation(format!("unknown job type id: {other}"))),
        }
    }
}

/// Wire-stable execution status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatusCode {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatusCode {
    pub fn id(self) -> i32 {
        match self {
            Self::Pending => 1,
            Self::Running => 2,
            Self::Success => 3,
            Self::Failed => 4,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Registered task function a job can point at.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TaskFunction {
    pub id: Uuid,
    pub key: String,
    pub function_path: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskFunction {
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM task_functions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("TaskFunction", id))
    }

    pub async fn find_by_key(key: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM task_functions WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM task_functions ORDER BY key")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }

    /// Upsert by key, keeping the existing id.
    pub async fn ensure(
        key: &str,
        function_path: &str,
        name_en: &str,
        name_ar: &str,
        pool: &PgPool,
    ) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO task_functions (
                id, key, function_path, name_en, name_ar, is_active, created_at
             )
             VALUES ($1, $2, $3, $4, $5, true, $6)
             ON CONFLICT (key) DO UPDATE SET
                 function_path = EXCLUDED.function_path,
                 name_en = EXCLUDED.name_en,
                 name_ar = EXCLUDED.name_ar
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(key)
        .bind(function_path)
        .bind(name_en)
        .bind(name_ar)
        .bind(clock::now())
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_active(id: Uuid, active: bool, pool: &PgPool) -> AppResult<()> {
        sqlx::query("UPDATE task_functions SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SchedulerJobType {
    pub id: i32,
    pub code: String,
    pub name_en: String,
    pub name_ar: String,
}

impl SchedulerJobType {
    pub async fn list(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduler_job_types ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SchedulerExecutionStatus {
    pub id: i32,
    pub code: String,
    pub name_en: String,
    pub name_ar: String,
}

impl SchedulerExecutionStatus {
    pub async fn list(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduler_execution_statuses ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(Into::into)
    }
}

/// Seed the scheduler lookup tables with their canonical rows.
pub async fn seed_lookup_tables(pool: &PgPool) -> AppResult<()> {
    let job_types = [
        (JobTypeCode::Interval, "Interval", "فاصل زمني"),
        (JobTypeCode::Cron, "Cron", "جدول زمني"),
    ];
    for (code, name_en, name_ar) in job_types {
        sqlx::query(
            "INSERT INTO scheduler_job_types (id, code, name_en, name_ar)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(code.id())
        .bind(code.code())
        .bind(name_en)
        .bind(name_ar)
        .execute(pool)
        .await?;
    }

    let statuses = [
        (ExecutionStatusCode::Pending, "Pending", "قيد الانتظار"),
        (ExecutionStatusCode::Running, "Running", "قيد التنفيذ"),
        (ExecutionStatusCode::Success, "Success", "ناجح"),
        (ExecutionStatusCode::Failed, "Failed", "فشل"),
    ];
    for (code, name_en, name_ar) in statuses {
        sqlx::query(
            "INSERT INTO scheduler_execution_statuses (id, code, name_en, name_ar)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(code.id())
        .bind(code.code())
        .bind(name_en)
        .bind(name_ar)
        .execute(pool)
        .await?;
    }

    info!("scheduler lookup tables seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ids_are_wire_stable() {
        assert_eq!(ExecutionStatusCode::Pending.id(), 1);
        assert_eq!(ExecutionStatusCode::Running.id(), 2);
        assert_eq!(ExecutionStatusCode::Success.id(), 3);
        assert_eq!(ExecutionStatusCode::Failed.id(), 4);
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(!ExecutionStatusCode::Pending.is_terminal());
        assert!(!ExecutionStatusCode::Running.is_terminal());
        assert!(ExecutionStatusCode::Success.is_terminal());
        assert!(ExecutionStatusCode::Failed.is_terminal());
    }

    #[test]
    fn job_type_ids_round_trip() {
        assert_eq!(
            JobTypeCode::from_id(JobTypeCode::Cron.id()).expect("round trip"),
            JobTypeCode::Cron
        );
        assert!(JobTypeCode::from_id(9).is_err());
    }
}
