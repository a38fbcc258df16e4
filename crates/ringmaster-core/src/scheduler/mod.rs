//! Dynamic scheduler: cron-driven jobs that invoke a single tool or a full
//! agent run, with validation, retries, timeouts, dry-run, execution
//! history, and result notifications.

mod runner;
mod service;
mod stores;
mod types;

pub use runner::SchedulerRunner;
pub use service::{SchedulerError, SchedulerService};
pub use stores::{ExecutionStore, InMemoryExecutionStore, InMemoryJobStore, JobStore};
pub use types::{
    ExecutionStatus, JobType, ScheduledJob, ScheduledJobExecution, parse_cron, validate_timezone,
};
