//! Built-in scheduled task functions.
//!
//! Business job bodies are registered here at startup: HRIS replication,
//! attendance sliding-window sync, scheduler history cleanup, and session
//! cleanup. Each task also ensures its `TaskFunction` lookup row so jobs can
//! reference it by key.

use std::sync::Arc;

use tracing::info;

use crate::common::AppResult;
use crate::kernel::jobs::{ScheduledJob, ScheduledJobExecution, TaskFunction};
use crate::kernel::ServerKernel;

pub const TASK_HRIS_REPLICATION: &str = "hris_replication";
pub const TASK_ATTENDANCE_SYNC: &str = "attendance_sync";
pub const TASK_SCHEDULER_CLEANUP: &str = "scheduler_cleanup";
pub const TASK_SESSION_CLEANUP: &str = "session_cleanup";

/// Ensure lookup rows and register every built-in job body.
pub async fn register_builtin_jobs(kernel: &Arc<ServerKernel>) -> AppResult<()> {
    let pool = &kernel.db_pool;
    TaskFunction::ensure(
        TASK_HRIS_REPLICATION,
        "hris::replicator::run",
        "HRIS Replication",
        "مزامنة الموارد البشرية",
        pool,
    )
    .await?;
    TaskFunction::ensure(
        TASK_ATTENDANCE_SYNC,
        "attendance::sync::sliding_window",
        "Attendance Sync",
        "مزامنة الحضور",
        pool,
    )
    .await?;
    TaskFunction::ensure(
        TASK_SCHEDULER_CLEANUP,
        "scheduler::cleanup_history",
        "Scheduler History Cleanup",
        "تنظيف سجل المجدول",
        pool,
    )
    .await?;
    TaskFunction::ensure(
        TASK_SESSION_CLEANUP,
        "auth::sessions::cleanup_expired",
        "Session Cleanup",
        "تنظيف الجلسات",
        pool,
    )
    .await?;

    let registry = kernel.scheduler.registry();

    let replicator = kernel.replicator.clone();
    registry
        .register(TASK_HRIS_REPLICATION, move || {
            let replicator = replicator.clone();
            async move {
                let summary = replicator.run(None).await?;
                Ok(summary.describe())
            }
        })
        .await;

    let attendance = kernel.attendance.clone();
    let months_back = kernel.config.attendance.months_back;
    registry
        .register(TASK_ATTENDANCE_SYNC, move || {
            let attendance = attendance.clone();
            async move {
                let outcome = attendance.sync_window(months_back).await?;
                Ok(outcome.describe())
            }
        })
        .await;

    let history_pool = kernel.db_pool.clone();
    let retention_days = kernel.config.scheduler.history_retention_days;
    registry
        .register(TASK_SCHEDULER_CLEANUP, move || {
            let pool = history_pool.clone();
            async move {
                let deleted = ScheduledJobExecution::cleanup_older_than(retention_days, &pool).await?;
                Ok(format!("{deleted} execution rows deleted"))
            }
        })
        .await;

    let sessions = kernel.sessions.clone();
    registry
        .register(TASK_SESSION_CLEANUP, move || {
            let sessions = sessions.clone();
            async move {
                let (expired_sessions, expired_tokens) = sessions.cleanup_expired().await?;
                Ok(format!(
                    "{expired_sessions} sessions, {expired_tokens} revoked tokens removed"
                ))
            }
        })
        .await;

    Ok(())
}

/// Create the default job rows on first start. Existing jobs (including
/// disabled or re-tuned ones) are left alone.
pub async fn ensure_default_jobs(kernel: &Arc<ServerKernel>) -> AppResult<()> {
    let pool = &kernel.db_pool;

    if kernel.config.attendance.enabled
        && ScheduledJob::find_by_task_key(TASK_ATTENDANCE_SYNC, pool)
            .await?
            .is_none()
    {
        let job = kernel
            .scheduler
            .create_interval_job(
                TASK_ATTENDANCE_SYNC,
                None,
                Some(kernel.config.attendance.interval_minutes as i32),
                None,
                None,
                None,
            )
            .await?;
        info!(job_id = %job.id, "created default attendance sync job");
    }

    for (key, cron) in [
        (TASK_SCHEDULER_CLEANUP, "0 3 * * *"),
        (TASK_SESSION_CLEANUP, "30 3 * * *"),
    ] {
        if ScheduledJob::find_by_task_key(key, pool).await?.is_none() {
            let job = kernel.scheduler.create_cron_job(key, cron, None).await?;
            info!(job_id = %job.id, key, "created default cleanup job");
        }
    }

    Ok(())
}
