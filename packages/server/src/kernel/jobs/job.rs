//! Scheduled job model.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};

use super::lookup::JobTypeCode;
use super::triggers::Trigger;

/// A registered job and its schedule.
///
/// Exactly one schedule representation is populated: interval jobs carry at
/// least one interval field and no cron expression, cron jobs the reverse.
/// Deletion is soft (`is_active = false`) so execution history keeps its
/// foreign key target.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub task_function_id: Uuid,
    pub job_type_id: i32,
    pub interval_seconds: Option<i32>,
    pub interval_minutes: Option<i32>,
    pub interval_hours: Option<i32>,
    pub interval_days: Option<i32>,
    pub cron_expression: Option<String>,
    pub priority: i32,
    pub max_instances: i32,
    pub misfire_grace_time: Option<i32>,
    pub coalesce: bool,
    pub is_enabled: bool,
    pub is_active: bool,
    pub is_primary: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new_interval(
        task_function_id: Uuid,
        seconds: Option<i32>,
        minutes: Option<i32>,
        hours: Option<i32>,
        days: Option<i32>,
    ) -> Self {
        let now = clock::now();
        Self {
            id: clock::db_id(),
            task_function_id,
            job_type_id: JobTypeCode::Interval.id(),
            interval_seconds: seconds,
            interval_minutes: minutes,
            interval_hours: hours,
            interval_days: days,
            cron_expression: None,
            priority: 0,
            max_instances: 1,
            misfire_grace_time: None,
            coalesce: true,
            is_enabled: true,
            is_active: true,
            is_primary: false,
            last_run_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_cron(task_function_id: Uuid, expression: &str) -> Self {
        let now = clock::now();
        Self {
            id: clock::db_id(),
            task_function_id,
            job_type_id: JobTypeCode::Cron.id(),
            interval_seconds: None,
            interval_minutes: None,
            interval_hours: None,
            interval_days: None,
            cron_expression: Some(expression.to_string()),
            priority: 0,
            max_instances: 1,
            misfire_grace_time: None,
            coalesce: true,
            is_enabled: true,
            is_active: true,
            is_primary: false,
            last_run_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of the interval fields, in seconds.
    pub fn total_interval_seconds(&self) -> i64 {
        self.interval_seconds.unwrap_or(0) as i64
            + self.interval_minutes.unwrap_or(0) as i64 * 60
            + self.interval_hours.unwrap_or(0) as i64 * 3_600
            + self.interval_days.unwrap_or(0) as i64 * 86_400
    }

    /// Check the schedule representation matches the job type.
    pub fn validate_schedule(&self) -> AppResult<()> {
        match JobTypeCode::from_id(self.job_type_id)? {
            JobTypeCode::Interval => {
                if self.cron_expression.is_some() {
                    return Err(AppError::validation(
                        "interval jobs must not carry a cron expression",
                    ));
                }
                if self.total_interval_seconds() <= 0 {
                    return Err(AppError::validation(
                        "interval jobs need at least one positive interval field",
                    ));
                }
            }
            JobTypeCode::Cron => {
                if self.total_interval_seconds() != 0 {
                    return Err(AppError::validation(
                        "cron jobs must not carry interval fields",
                    ));
                }
                let expression = self
                    .cron_expression
                    .as_deref()
                    .ok_or_else(|| AppError::validation("cron jobs need a cron expression"))?;
                Trigger::cron(expression)?;
            }
        }
        Ok(())
    }

    /// Build the evaluator for this job's schedule.
    pub fn trigger(&self) -> AppResult<Trigger> {
        match JobTypeCode::from_id(self.job_type_id)? {
            JobTypeCode::Interval => Trigger::interval(self.total_interval_seconds()),
            JobTypeCode::Cron => Trigger::cron(
                self.cron_expression
                    .as_deref()
                    .ok_or_else(|| AppError::validation("cron jobs need a cron expression"))?,
            ),
        }
    }

    pub fn misfire_grace(&self) -> Option<chrono::Duration> {
        self.misfire_grace_time
            .map(|secs| chrono::Duration::seconds(secs as i64))
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM scheduled_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("ScheduledJob", id))
    }

    pub async fn find_by_task_key(key: &str, pool: &PgPool) -> AppResult<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT j.* FROM scheduled_jobs j
             JOIN task_functions tf ON tf.id = j.task_function_id
             WHERE tf.key = $1 AND j.is_active = true
             LIMIT 1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn list(include_inactive: bool, pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM scheduled_jobs
             WHERE ($1 OR is_active = true)
             ORDER BY priority DESC, created_at DESC",
        )
        .bind(include_inactive)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Jobs eligible for trigger evaluation, in dispatch order. Jobs whose
    /// task function has been deactivated are unschedulable and excluded.
    pub async fn list_schedulable(pool: &PgPool) -> AppResult<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT j.* FROM scheduled_jobs j
             JOIN task_functions tf ON tf.id = j.task_function_id
             WHERE j.is_enabled = true
               AND j.is_active = true
               AND tf.is_active = true
             ORDER BY j.priority DESC, j.created_at DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> AppResult<Self> {
        self.validate_schedule()?;
        sqlx::query_as::<_, Self>(
            "INSERT INTO scheduled_jobs (
                id, task_function_id, job_type_id,
                interval_seconds, interval_minutes, interval_hours, interval_days,
                cron_expression, priority, max_instances, misfire_grace_time,
                coalesce, is_enabled, is_active, is_primary, last_run_at,
                created_by, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.task_function_id)
        .bind(self.job_type_id)
        .bind(self.interval_seconds)
        .bind(self.interval_minutes)
        .bind(self.interval_hours)
        .bind(self.interval_days)
        .bind(&self.cron_expression)
        .bind(self.priority)
        .bind(self.max_instances)
        .bind(self.misfire_grace_time)
        .bind(self.coalesce)
        .bind(self.is_enabled)
        .bind(self.is_active)
        .bind(self.is_primary)
        .bind(self.last_run_at)
        .bind(self.created_by)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn update(&self, pool: &PgPool) -> AppResult<Self> {
        self.validate_schedule()?;
        sqlx::query_as::<_, Self>(
            "UPDATE scheduled_jobs SET
                task_function_id = $2, job_type_id = $3,
                interval_seconds = $4, interval_minutes = $5, interval_hours = $6,
                interval_days = $7, cron_expression = $8, priority = $9,
                max_instances = $10, misfire_grace_time = $11, coalesce = $12,
                is_enabled = $13, is_primary = $14, updated_at = NOW()
             WHERE id = $1 AND is_active = true
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.task_function_id)
        .bind(self.job_type_id)
        .bind(self.interval_seconds)
        .bind(self.interval_minutes)
        .bind(self.interval_hours)
        .bind(self.interval_days)
        .bind(&self.cron_expression)
        .bind(self.priority)
        .bind(self.max_instances)
        .bind(self.misfire_grace_time)
        .bind(self.coalesce)
        .bind(self.is_enabled)
        .bind(self.is_primary)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("ScheduledJob", self.id))
    }

    pub async fn set_enabled(id: Uuid, enabled: bool, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE scheduled_jobs SET is_enabled = $2, updated_at = NOW()
             WHERE id = $1 AND is_active = true
             RETURNING *",
        )
        .bind(id)
        .bind(enabled)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("ScheduledJob", id))
    }

    /// Soft delete: history rows stay attached.
    pub async fn soft_delete(id: Uuid, pool: &PgPool) -> AppResult<Self> {
        sqlx::query_as::<_, Self>(
            "UPDATE scheduled_jobs
             SET is_active = false, is_enabled = false, updated_at = NOW()
             WHERE id = $1 AND is_active = true
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("ScheduledJob", id))
    }

    pub async fn touch_last_run(
        id: Uuid,
        ran_at: DateTime<Utc>,
        conn: &mut sqlx::PgConnection,
    ) -> AppResult<()> {
        sqlx::query("UPDATE scheduled_jobs SET last_run_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(ran_at)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_fields_sum() {
        let job = ScheduledJob::new_interval(Uuid::new_v4(), Some(30), Some(1), Some(1), None);
        assert_eq!(job.total_interval_seconds(), 30 + 60 + 3_600);
    }

    #[test]
    fn interval_job_with_cron_is_invalid() {
        let mut job = ScheduledJob::new_interval(Uuid::new_v4(), Some(60), None, None, None);
        job.cron_expression = Some("0 * * * *".to_string());
        assert!(job.validate_schedule().is_err());
    }

    #[test]
    fn interval_job_without_fields_is_invalid() {
        let job = ScheduledJob::new_interval(Uuid::new_v4(), None, None, None, None);
        assert!(job.validate_schedule().is_err());
    }

    #[test]
    fn cron_job_with_interval_fields_is_invalid() {
        let mut job = ScheduledJob::new_cron(Uuid::new_v4(), "0 * * * *");
        job.interval_minutes = Some(5);
        assert!(job.validate_schedule().is_err());
    }

    #[test]
    fn well_formed_jobs_validate() {
        assert!(
            ScheduledJob::new_interval(Uuid::new_v4(), Some(60), None, None, None)
                .validate_schedule()
                .is_ok()
        );
        assert!(ScheduledJob::new_cron(Uuid::new_v4(), "0 * * * *")
            .validate_schedule()
            .is_ok());
    }

    #[test]
    fn trigger_builds_for_both_types() {
        let interval = ScheduledJob::new_interval(Uuid::new_v4(), None, Some(5), None, None);
        assert!(interval.trigger().is_ok());
        let cron = ScheduledJob::new_cron(Uuid::new_v4(), "30 2 * * *");
        assert!(cron.trigger().is_ok());
    }
}
