//! Job dispatch: in-process execution or hand-off to an external queue.
//!
//! The scheduler core does not know which route a job takes. It hands the
//! invocation to a [`Dispatcher`] and reacts to the outcome: an in-process
//! completion carries the terminal status, a queue hand-off leaves the
//! execution `running` for the external worker to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};
use uuid::Uuid;

use crate::common::{AppError, AppResult};

use super::registry::JobRegistry;

/// Result summaries are bounded so a chatty job cannot bloat history rows.
const MAX_SUMMARY_LEN: usize = 500;

#[derive(Debug, Clone)]
pub enum DispatchResult {
    /// The job ran to completion in this process.
    Completed {
        success: bool,
        summary: Option<String>,
        error: Option<String>,
    },
    /// The job was handed to the external queue; completion will be written
    /// by the external worker.
    HandedOff { task_id: String },
}

impl DispatchResult {
    fn failed(error: impl Into<String>) -> Self {
        Self::Completed {
            success: false,
            summary: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Run or route one job invocation. `timeout` bounds in-process wall
    /// clock; `None` leaves long periodic jobs unbounded.
    async fn dispatch(
        &self,
        job_key: &str,
        execution_id: Uuid,
        timeout: Option<Duration>,
    ) -> DispatchResult;
}

/// External task queue capability. The queue implementation itself lives
/// outside the core.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Whether this job key is routed to the queue at all.
    fn routes(&self, job_key: &str) -> bool;

    /// Enqueue and return the queue's opaque task id.
    async fn enqueue(&self, job_key: &str, execution_id: Uuid) -> AppResult<String>;
}

fn truncate_summary(summary: String) -> String {
    if summary.len() <= MAX_SUMMARY_LEN {
        return summary;
    }
    let mut cut = MAX_SUMMARY_LEN;
    while !summary.is_char_boundary(cut) {
        cut -= 1;
    }
    summary[..cut].to_string()
}

/// Runs registered job functions on the local runtime.
pub struct InProcessDispatcher {
    registry: Arc<JobRegistry>,
}

impl InProcessDispatcher {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Dispatcher for InProcessDispatcher {
    async fn dispatch(
        &self,
        job_key: &str,
        execution_id: Uuid,
        timeout: Option<Duration>,
    ) -> DispatchResult {
        let Some(func) = self.registry.resolve(job_key).await else {
            warn!(job_key, "no function registered for job, skipping");
            return DispatchResult::failed(format!("unknown job function: {job_key}"));
        };

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, func()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(limit.as_secs())),
            },
            None => func().await,
        };

        match outcome {
            Ok(summary) => DispatchResult::Completed {
                success: true,
                summary: Some(truncate_summary(summary)),
                error: None,
            },
            Err(e) => {
                error!(job_key, %execution_id, "job execution failed: {e}");
                DispatchResult::failed(e.to_string())
            }
        }
    }
}

/// Routes queue-enabled jobs to the external queue, falling back to
/// in-process execution when the queue rejects or is not configured for the
/// key. Either way the execution finishes deterministically.
pub struct QueueDispatcher {
    queue: Arc<dyn TaskQueue>,
    fallback: InProcessDispatcher,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, registry: Arc<JobRegistry>) -> Self {
        Self {
            queue,
            fallback: InProcessDispatcher::new(registry),
        }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(
        &self,
        job_key: &str,
        execution_id: Uuid,
        timeout: Option<Duration>,
    ) -> DispatchResult {
        if self.queue.routes(job_key) {
            match self.queue.enqueue(job_key, execution_id).await {
                Ok(task_id) => return DispatchResult::HandedOff { task_id },
                Err(e) => {
                    warn!(job_key, "queue dispatch failed, falling back to in-process: {e}");
                }
            }
        }
        self.fallback.dispatch(job_key, execution_id, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry_with(key: &str) -> Arc<JobRegistry> {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register(key, || async { Ok("42 rows".to_string()) })
            .await;
        registry
    }

    #[tokio::test]
    async fn in_process_success_carries_summary() {
        let dispatcher = InProcessDispatcher::new(registry_with("sync").await);
        match dispatcher.dispatch("sync", Uuid::new_v4(), None).await {
            DispatchResult::Completed {
                success, summary, ..
            } => {
                assert!(success);
                assert_eq!(summary.as_deref(), Some("42 rows"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_key_fails_deterministically() {
        let dispatcher = InProcessDispatcher::new(Arc::new(JobRegistry::new()));
        match dispatcher.dispatch("missing", Uuid::new_v4(), None).await {
            DispatchResult::Completed { success, error, .. } => {
                assert!(!success);
                assert!(error.expect("error set").contains("missing"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("done".to_string())
            })
            .await;
        let dispatcher = InProcessDispatcher::new(registry);

        match dispatcher
            .dispatch("slow", Uuid::new_v4(), Some(Duration::from_millis(20)))
            .await
        {
            DispatchResult::Completed { success, error, .. } => {
                assert!(!success);
                assert!(error.expect("error set").contains("timed out"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_job_reports_error() {
        let registry = Arc::new(JobRegistry::new());
        registry
            .register("broken", || async {
                Err(AppError::external("upstream offline"))
            })
            .await;
        let dispatcher = InProcessDispatcher::new(registry);

        match dispatcher.dispatch("broken", Uuid::new_v4(), None).await {
            DispatchResult::Completed { success, error, .. } => {
                assert!(!success);
                assert!(error.expect("error set").contains("upstream offline"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    struct StubQueue {
        healthy: bool,
    }

    #[async_trait]
    impl TaskQueue for StubQueue {
        fn routes(&self, job_key: &str) -> bool {
            job_key == "queued"
        }

        async fn enqueue(&self, _job_key: &str, _execution_id: Uuid) -> AppResult<String> {
            if self.healthy {
                Ok("task-7".to_string())
            } else {
                Err(AppError::external("queue unreachable"))
            }
        }
    }

    #[tokio::test]
    async fn queue_route_hands_off() {
        let registry = registry_with("queued").await;
        let dispatcher = QueueDispatcher::new(Arc::new(StubQueue { healthy: true }), registry);
        match dispatcher.dispatch("queued", Uuid::new_v4(), None).await {
            DispatchResult::HandedOff { task_id } => assert_eq!(task_id, "task-7"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_queue_falls_back_in_process() {
        let registry = registry_with("queued").await;
        let dispatcher = QueueDispatcher::new(Arc::new(StubQueue { healthy: false }), registry);
        match dispatcher.dispatch("queued", Uuid::new_v4(), None).await {
            DispatchResult::Completed { success, .. } => assert!(success),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrouted_key_stays_in_process() {
        let registry = registry_with("sync").await;
        let dispatcher = QueueDispatcher::new(Arc::new(StubQueue { healthy: true }), registry);
        match dispatcher.dispatch("sync", Uuid::new_v4(), None).await {
            DispatchResult::Completed { success, .. } => assert!(success),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn summaries_are_truncated() {
        let long = "x".repeat(2_000);
        assert_eq!(truncate_summary(long).len(), MAX_SUMMARY_LEN);
        assert_eq!(truncate_summary("short".to_string()), "short");
    }
}
