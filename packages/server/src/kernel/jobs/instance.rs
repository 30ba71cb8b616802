//! Scheduler instance registry and heartbeats.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "scheduler_instance_mode", rename_all = "snake_case")]
pub enum InstanceMode {
    Embedded,
    Standalone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "scheduler_instance_status", rename_all = "snake_case")]
pub enum InstanceStatus {
    Starting,
    Running,
    Paused,
    Stopped,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SchedulerInstance {
    pub id: Uuid,
    pub instance_name: String,
    pub host_name: String,
    pub process_id: i32,
    pub mode: InstanceMode,
    pub status: InstanceStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl SchedulerInstance {
    pub async fn register(
        instance_name: &str,
        host_name: &str,
        process_id: i32,
        mode: InstanceMode,
        pool: &PgPool,
    ) -> AppResult<Self> {
        let now = clock::now();
        sqlx::query_as::<_, Self>(
            "INSERT INTO scheduler_instances (
                id, instance_name, host_name, process_id, mode, status,
                last_heartbeat, started_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(clock::db_id())
        .bind(instance_name)
        .bind(host_name)
        .bind(process_id)
        .bind(mode)
        .bind(InstanceStatus::Starting)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn set_status(id: Uuid, status: InstanceStatus, pool: &PgPool) -> AppResult<()> {
        sqlx::query("UPDATE scheduler_instances SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn heartbeat(id: Uuid, pool: &PgPool) -> AppResult<()> {
        sqlx::query("UPDATE scheduler_instances SET last_heartbeat = $2 WHERE id = $1")
            .bind(id)
            .bind(clock::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn mark_stopped(id: Uuid, pool: &PgPool) -> AppResult<()> {
        sqlx::query(
            "UPDATE scheduler_instances
             SET status = $2, stopped_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(InstanceStatus::Stopped)
        .bind(clock::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark instances whose heartbeat went silent as stopped.
    pub async fn cleanup_stale(threshold_seconds: i64, pool: &PgPool) -> AppResult<u64> {
        let cutoff = clock::now() - chrono::Duration::seconds(threshold_seconds);
        let stopped = sqlx::query(
            "UPDATE scheduler_instances
             SET status = $2, stopped_at = $3
             WHERE last_heartbeat < $1 AND status IN ($4, $5, $6)",
        )
        .bind(cutoff)
        .bind(InstanceStatus::Stopped)
        .bind(clock::now())
        .bind(InstanceStatus::Starting)
        .bind(InstanceStatus::Running)
        .bind(InstanceStatus::Paused)
        .execute(pool)
        .await?
        .rows_affected();
        Ok(stopped)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduler_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("SchedulerInstance", id))
    }

    pub async fn list(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduler_instances ORDER BY started_at DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
