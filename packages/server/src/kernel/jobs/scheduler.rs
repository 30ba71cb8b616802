//! Scheduler core: trigger evaluation, leader-coordinated dispatch,
//! lifecycle tracking, heartbeats.
//!
//! # Dispatch flow
//!
//! ```text
//! tick (1s)
//!     │
//!     ├─► load schedulable jobs (priority DESC, created_at DESC)
//!     ├─► evaluate triggers (interval / cron, misfire grace, coalesce)
//!     └─► for each due firing:
//!             begin tx
//!               insert execution (running)
//!               acquire job lock ──(held elsewhere)──► rollback, skip
//!               set started_at, touch last_run_at
//!             commit
//!             dispatch (in-process or queue hand-off)
//!             write terminal status, release lock
//! ```
//!
//! Periodic firings that lose the lock never persist an execution row.
//! Manual triggers persist immediately at `running` and record `lock held`
//! as a failure when they cannot take the lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::clock;
use crate::common::{AppError, AppResult};
use crate::config::SchedulerConfig;

use super::dispatcher::{DispatchResult, Dispatcher};
use super::execution::ScheduledJobExecution;
use super::instance::{InstanceMode, InstanceStatus, SchedulerInstance};
use super::job::ScheduledJob;
use super::lock::ScheduledJobLock;
use super::lookup::{
    seed_lookup_tables, ExecutionStatusCode, SchedulerExecutionStatus, SchedulerJobType,
    TaskFunction,
};
use super::registry::JobRegistry;
use super::triggers::due_fires;

/// Aggregate view for operators.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub instances: Vec<SchedulerInstance>,
    pub running_executions: i64,
    pub registered_functions: Vec<String>,
}

pub struct SchedulerCore {
    pool: PgPool,
    registry: Arc<JobRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    config: SchedulerConfig,
    executor_id: String,
    host_name: String,
    instance_id: OnceLock<Uuid>,
    paused: AtomicBool,
    shutdown: CancellationToken,
}

impl SchedulerCore {
    pub fn new(
        pool: PgPool,
        registry: Arc<JobRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let host_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        let instance_name = config
            .instance_name
            .clone()
            .unwrap_or_else(|| format!("scheduler-{}", &Uuid::new_v4().simple().to_string()[..8]));
        Arc::new(Self {
            pool,
            registry,
            dispatcher,
            config,
            executor_id: instance_name,
            host_name,
            instance_id: OnceLock::new(),
            paused: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Seed lookup tables, register this instance, and launch the tick and
    /// heartbeat loops.
    pub async fn start(self: &Arc<Self>) -> AppResult<()> {
        if !self.config.enabled {
            info!("scheduler disabled by configuration");
            return Ok(());
        }

        seed_lookup_tables(&self.pool).await?;

        let mode = if self.config.mode.eq_ignore_ascii_case("standalone") {
            InstanceMode::Standalone
        } else {
            InstanceMode::Embedded
        };
        let instance = SchedulerInstance::register(
            &self.executor_id,
            &self.host_name,
            std::process::id() as i32,
            mode,
            &self.pool,
        )
        .await?;
        let _ = self.instance_id.set(instance.id);
        SchedulerInstance::set_status(instance.id, InstanceStatus::Running, &self.pool).await?;

        let runner = self.clone();
        tokio::spawn(async move { runner.run_loop().await });
        let beater = self.clone();
        tokio::spawn(async move { beater.heartbeat_loop().await });

        info!(
            instance = %self.executor_id,
            host = %self.host_name,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop loops and mark the instance stopped.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(id) = self.instance_id.get() {
            if let Err(e) = SchedulerInstance::mark_stopped(*id, &self.pool).await {
                warn!("failed to mark scheduler instance stopped: {e}");
            }
        }
        info!(instance = %self.executor_id, "scheduler stopped");
    }

    /// Suspend trigger evaluation without touching job rows.
    pub async fn pause(&self) -> AppResult<()> {
        self.paused.store(true, Ordering::SeqCst);
        if let Some(id) = self.instance_id.get() {
            SchedulerInstance::set_status(*id, InstanceStatus::Paused, &self.pool).await?;
        }
        info!(instance = %self.executor_id, "scheduler paused");
        Ok(())
    }

    pub async fn resume(&self) -> AppResult<()> {
        self.paused.store(false, Ordering::SeqCst);
        if let Some(id) = self.instance_id.get() {
            SchedulerInstance::set_status(*id, InstanceStatus::Running, &self.pool).await?;
        }
        info!(instance = %self.executor_id, "scheduler resumed");
        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Err(e) = self.tick().await {
                        error!("scheduler tick failed: {e}");
                    }
                }
            }
        }
    }

    /// One pass of trigger evaluation over every schedulable job.
    async fn tick(self: &Arc<Self>) -> AppResult<()> {
        let now = clock::now();
        let jobs = ScheduledJob::list_schedulable(&self.pool).await?;

        for job in jobs {
            let trigger = match job.trigger() {
                Ok(trigger) => trigger,
                Err(e) => {
                    warn!(job_id = %job.id, "job has an unusable schedule, skipping: {e}");
                    continue;
                }
            };

            let last = job.last_run_at.unwrap_or(job.created_at);
            let fires = due_fires(&trigger, last, now, job.misfire_grace(), job.coalesce);
            if fires.is_empty() {
                continue;
            }

            let running = ScheduledJobExecution::count_running(job.id, &self.pool).await?;
            if running >= job.max_instances as i64 {
                debug!(
                    job_id = %job.id,
                    running,
                    "max_instances reached, deferring firing"
                );
                continue;
            }

            for fire_at in fires {
                self.run_periodic(&job, fire_at).await?;
            }
        }
        Ok(())
    }

    /// Execute one periodic firing. Returns the execution id when this
    /// instance won the lock, `None` when the firing was skipped.
    async fn run_periodic(
        self: &Arc<Self>,
        job: &ScheduledJob,
        scheduled_at: DateTime<Utc>,
    ) -> AppResult<Option<Uuid>> {
        let task = TaskFunction::find_by_id(job.task_function_id, &self.pool).await?;
        if !self.registry.contains(&task.key).await {
            warn!(job_key = %task.key, "job function not registered, skipping job");
            return Ok(None);
        }

        let execution_id = clock::db_id();
        let started_at = clock::now();

        let mut tx = self.pool.begin().await?;
        ScheduledJobExecution::running(
            job.id,
            execution_id,
            scheduled_at,
            None,
            &self.executor_id,
            &self.host_name,
            None,
        )
        .insert(&mut tx)
        .await?;

        let lock = ScheduledJobLock::acquire(
            job.id,
            execution_id,
            &self.executor_id,
            &self.host_name,
            self.config.lock_duration_seconds,
            &mut tx,
        )
        .await?;
        if lock.is_none() {
            // Skipped firings leave no execution row behind.
            tx.rollback().await?;
            debug!(job_id = %job.id, "lock held by another instance, skipping firing");
            return Ok(None);
        }

        sqlx::query(
            "UPDATE scheduled_job_executions SET started_at = $2 WHERE execution_id = $1",
        )
        .bind(execution_id)
        .bind(started_at)
        .execute(&mut *tx)
        .await?;
        ScheduledJob::touch_last_run(job.id, scheduled_at, &mut tx).await?;
        tx.commit().await?;

        // Long periodic jobs must not stall trigger evaluation for everyone
        // else; they run unbounded on their own task.
        let this = self.clone();
        let job_id = job.id;
        let key = task.key.clone();
        tokio::spawn(async move {
            let result = this.dispatcher.dispatch(&key, execution_id, None).await;
            if let Err(e) = this.settle(job_id, execution_id, result).await {
                error!(%execution_id, "failed to record periodic execution outcome: {e}");
            }
        });
        Ok(Some(execution_id))
    }

    /// Manually fire a job. Returns the new execution id; the body runs in
    /// the background under the manual wall-clock timeout.
    pub async fn trigger_job_now(
        self: &Arc<Self>,
        job_id: Uuid,
        triggered_by: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let job = ScheduledJob::find_by_id(job_id, &self.pool).await?;
        if !job.is_active {
            return Err(AppError::not_found("ScheduledJob", job_id));
        }
        let task = TaskFunction::find_by_id(job.task_function_id, &self.pool).await?;
        if !task.is_active {
            return Err(AppError::validation(format!(
                "task function {} is inactive",
                task.key
            )));
        }

        if let Some(in_flight) = ScheduledJobExecution::find_in_flight(job_id, &self.pool).await? {
            return Err(AppError::duplicate_trigger(in_flight.execution_id));
        }

        let execution_id = clock::db_id();
        let now = clock::now();
        {
            let mut conn = self.pool.acquire().await?;
            ScheduledJobExecution::running(
                job.id,
                execution_id,
                now,
                Some(now),
                &self.executor_id,
                &self.host_name,
                triggered_by,
            )
            .insert(&mut conn)
            .await?;
            ScheduledJob::touch_last_run(job.id, now, &mut conn).await?;
        }

        let lock = {
            let mut conn = self.pool.acquire().await?;
            ScheduledJobLock::acquire(
                job.id,
                execution_id,
                &self.executor_id,
                &self.host_name,
                self.config.lock_duration_seconds,
                &mut conn,
            )
            .await?
        };
        if lock.is_none() {
            ScheduledJobExecution::complete(
                execution_id,
                ExecutionStatusCode::Failed,
                None,
                Some("lock held"),
                None,
                &self.pool,
            )
            .await?;
            warn!(job_id = %job.id, "manual trigger could not take the job lock");
            return Ok(execution_id);
        }

        let this = self.clone();
        let key = task.key.clone();
        let timeout = StdDuration::from_secs(self.config.manual_timeout_seconds);
        tokio::spawn(async move {
            let result = this.dispatcher.dispatch(&key, execution_id, Some(timeout)).await;
            if let Err(e) = this.settle(job_id, execution_id, result).await {
                error!(%execution_id, "failed to record manual execution outcome: {e}");
            }
        });

        Ok(execution_id)
    }

    /// Write the outcome of a dispatch. For a queue hand-off the execution
    /// stays `running` and the lock stays held until the external worker
    /// reports through [`Self::complete_external`].
    async fn settle(
        &self,
        job_id: Uuid,
        execution_id: Uuid,
        result: DispatchResult,
    ) -> AppResult<()> {
        match result {
            DispatchResult::Completed {
                success,
                summary,
                error,
            } => {
                let status = if success {
                    ExecutionStatusCode::Success
                } else {
                    ExecutionStatusCode::Failed
                };
                ScheduledJobExecution::complete(
                    execution_id,
                    status,
                    summary.as_deref(),
                    error.as_deref(),
                    None,
                    &self.pool,
                )
                .await?;
                ScheduledJobLock::release(job_id, execution_id, &self.pool).await?;
            }
            DispatchResult::HandedOff { task_id } => {
                ScheduledJobExecution::append_summary(
                    execution_id,
                    &format!("Dispatched to queue (id={task_id})"),
                    &self.pool,
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Terminal write for externally executed jobs; the same update path the
    /// in-process route uses, exposed for the queue worker.
    pub async fn complete_external(
        &self,
        execution_id: Uuid,
        success: bool,
        summary: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        let execution = ScheduledJobExecution::find_by_execution_id(execution_id, &self.pool).await?;
        let status = if success {
            ExecutionStatusCode::Success
        } else {
            ExecutionStatusCode::Failed
        };
        ScheduledJobExecution::complete(execution_id, status, summary, error, None, &self.pool)
            .await?;
        ScheduledJobLock::release(execution.job_id, execution_id, &self.pool).await?;
        Ok(())
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(StdDuration::from_secs(self.config.heartbeat_seconds.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.heartbeat_pass().await {
                        warn!("heartbeat pass failed: {e}");
                    }
                }
            }
        }
    }

    async fn heartbeat_pass(&self) -> AppResult<()> {
        if let Some(id) = self.instance_id.get() {
            SchedulerInstance::heartbeat(*id, &self.pool).await?;
        }
        let stale =
            SchedulerInstance::cleanup_stale(self.config.stale_threshold_seconds, &self.pool)
                .await?;
        if stale > 0 {
            warn!(stale, "marked stale scheduler instances as stopped");
        }
        let expired = ScheduledJobLock::release_expired(&self.pool).await?;
        if expired > 0 {
            warn!(expired, "released expired job locks");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Management surface
    // ------------------------------------------------------------------

    pub async fn create_interval_job(
        &self,
        task_key: &str,
        seconds: Option<i32>,
        minutes: Option<i32>,
        hours: Option<i32>,
        days: Option<i32>,
        created_by: Option<Uuid>,
    ) -> AppResult<ScheduledJob> {
        let task = self.active_task(task_key).await?;
        let mut job = ScheduledJob::new_interval(task.id, seconds, minutes, hours, days);
        job.created_by = created_by;
        job.insert(&self.pool).await
    }

    pub async fn create_cron_job(
        &self,
        task_key: &str,
        expression: &str,
        created_by: Option<Uuid>,
    ) -> AppResult<ScheduledJob> {
        let task = self.active_task(task_key).await?;
        let mut job = ScheduledJob::new_cron(task.id, expression);
        job.created_by = created_by;
        job.insert(&self.pool).await
    }

    async fn active_task(&self, task_key: &str) -> AppResult<TaskFunction> {
        let task = TaskFunction::find_by_key(task_key, &self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("TaskFunction", task_key))?;
        if !task.is_active {
            return Err(AppError::validation(format!(
                "task function {task_key} is inactive"
            )));
        }
        Ok(task)
    }

    pub async fn get_job(&self, job_id: Uuid) -> AppResult<ScheduledJob> {
        ScheduledJob::find_by_id(job_id, &self.pool).await
    }

    pub async fn list_jobs(&self, include_inactive: bool) -> AppResult<Vec<ScheduledJob>> {
        ScheduledJob::list(include_inactive, &self.pool).await
    }

    pub async fn update_job(&self, job: &ScheduledJob) -> AppResult<ScheduledJob> {
        job.update(&self.pool).await
    }

    pub async fn enable_job(&self, job_id: Uuid) -> AppResult<ScheduledJob> {
        ScheduledJob::set_enabled(job_id, true, &self.pool).await
    }

    pub async fn disable_job(&self, job_id: Uuid) -> AppResult<ScheduledJob> {
        ScheduledJob::set_enabled(job_id, false, &self.pool).await
    }

    pub async fn delete_job(&self, job_id: Uuid) -> AppResult<ScheduledJob> {
        ScheduledJob::soft_delete(job_id, &self.pool).await
    }

    pub async fn job_history(
        &self,
        job_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<ScheduledJobExecution>> {
        ScheduledJobExecution::history_for_job(job_id, limit, &self.pool).await
    }

    pub async fn all_history(&self, limit: i64) -> AppResult<Vec<ScheduledJobExecution>> {
        ScheduledJobExecution::all_history(limit, &self.pool).await
    }

    /// Delete terminal executions beyond the retention window. Registered as
    /// the `scheduler_cleanup` task function.
    pub async fn cleanup_history(&self) -> AppResult<u64> {
        let deleted =
            ScheduledJobExecution::cleanup_older_than(self.config.history_retention_days, &self.pool)
                .await?;
        if deleted > 0 {
            info!(deleted, "scheduler history trimmed");
        }
        Ok(deleted)
    }

    pub async fn status(&self) -> AppResult<SchedulerStatus> {
        let instances = SchedulerInstance::list(&self.pool).await?;
        let running_executions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM scheduled_job_executions WHERE status_id = $1",
        )
        .bind(ExecutionStatusCode::Running.id())
        .fetch_one(&self.pool)
        .await?;
        Ok(SchedulerStatus {
            instances,
            running_executions,
            registered_functions: self.registry.keys().await,
        })
    }

    pub async fn list_task_functions(&self) -> AppResult<Vec<TaskFunction>> {
        TaskFunction::list(&self.pool).await
    }

    pub async fn list_job_types(&self) -> AppResult<Vec<SchedulerJobType>> {
        SchedulerJobType::list(&self.pool).await
    }

    pub async fn list_execution_statuses(&self) -> AppResult<Vec<SchedulerExecutionStatus>> {
        SchedulerExecutionStatus::list(&self.pool).await
    }
}
