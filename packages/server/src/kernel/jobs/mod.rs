//! Persistent job scheduling infrastructure.
//!
//! This module provides the scheduler core:
//! - [`ScheduledJob`] / [`ScheduledJobExecution`] / [`ScheduledJobLock`] -
//!   persistent job, history and lease models
//! - [`JobRegistry`] - key → callable map populated at startup
//! - [`Trigger`] - interval and five-field cron evaluation with misfire
//!   grace and coalescing
//! - [`Dispatcher`] - in-process execution or external queue hand-off
//! - [`SchedulerCore`] - tick loop, lock-guarded dispatch, heartbeats,
//!   management surface
//!
//! Business job bodies live in their domains; this module only provides the
//! machinery that runs them.

mod dispatcher;
mod execution;
mod instance;
mod job;
mod lock;
pub mod lookup;
mod registry;
mod scheduler;
pub mod triggers;

pub use dispatcher::{DispatchResult, Dispatcher, InProcessDispatcher, QueueDispatcher, TaskQueue};
pub use execution::ScheduledJobExecution;
pub use instance::{InstanceMode, InstanceStatus, SchedulerInstance};
pub use job::ScheduledJob;
pub use lock::ScheduledJobLock;
pub use lookup::{
    seed_lookup_tables, ExecutionStatusCode, JobTypeCode, SchedulerExecutionStatus,
    SchedulerJobType, TaskFunction,
};
pub use registry::{JobFn, JobRegistry};
pub use scheduler::{SchedulerCore, SchedulerStatus};
pub use triggers::Trigger;
