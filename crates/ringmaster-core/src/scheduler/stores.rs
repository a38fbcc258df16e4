use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::types::{ExecutionStatus, ScheduledJob, ScheduledJobExecution};

/// Maximum execution rows kept per job by the in-memory store.
const MAX_EXECUTIONS_PER_JOB: usize = 100;

// ─── Store traits ────────────────────────────────────────────────────────────

/// Persistence seam for job definitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job.  An empty id gets a fresh one assigned.
    async fn save(&self, job: ScheduledJob) -> ScheduledJob;

    async fn get(&self, id: &str) -> Option<ScheduledJob>;

    async fn list(&self) -> Vec<ScheduledJob>;

    /// Returns `true` when the job existed.
    async fn delete(&self, id: &str) -> bool;

    /// Record the outcome of the latest non-dry run on the job row.
    async fn update_execution_result(&self, id: &str, status: ExecutionStatus, result: &str);
}

/// Persistence seam for execution history.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save(&self, execution: ScheduledJobExecution) -> ScheduledJobExecution;

    /// Executions for one job, newest first, capped at `limit`.
    async fn find_by_job_id(&self, job_id: &str, limit: usize) -> Vec<ScheduledJobExecution>;
}

// ─── In-memory implementations ───────────────────────────────────────────────

/// Map-backed [`JobStore`].
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, ScheduledJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, mut job: ScheduledJob) -> ScheduledJob {
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        self.jobs.write().insert(job.id.clone(), job.clone());
        job
    }

    async fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.read().get(id).cloned()
    }

    async fn list(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }

    async fn delete(&self, id: &str) -> bool {
        self.jobs.write().remove(id).is_some()
    }

    async fn update_execution_result(&self, id: &str, status: ExecutionStatus, result: &str) {
        if let Some(job) = self.jobs.write().get_mut(id) {
            job.last_execution_status = Some(status);
            job.last_execution_result = Some(result.to_string());
            job.last_executed_at = Some(Utc::now());
        }
    }
}

/// Map-backed [`ExecutionStore`] with a per-job history cap.
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<String, Vec<ScheduledJobExecution>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, mut execution: ScheduledJobExecution) -> ScheduledJobExecution {
        if execution.id.is_empty() {
            execution.id = Uuid::new_v4().to_string();
        }
        let mut map = self.executions.write();
        let entries = map.entry(execution.job_id.clone()).or_default();
        entries.insert(0, execution.clone());
        entries.truncate(MAX_EXECUTIONS_PER_JOB);
        execution
    }

    async fn find_by_job_id(&self, job_id: &str, limit: usize) -> Vec<ScheduledJobExecution> {
        self.executions
            .read()
            .get(job_id)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobType;

    fn execution(job_id: &str, status: ExecutionStatus) -> ScheduledJobExecution {
        ScheduledJobExecution {
            id: String::new(),
            job_id: job_id.to_string(),
            job_name: "test".to_string(),
            status,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            duration_ms: 1,
            dry_run: false,
            result: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn save_assigns_id_when_empty() {
        let store = InMemoryJobStore::new();
        let job = store
            .save(ScheduledJob::agent("j", "0 * * * * *", "p"))
            .await;
        assert!(!job.id.is_empty());
        assert_eq!(store.get(&job.id).await.map(|j| j.name).as_deref(), Some("j"));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let store = InMemoryJobStore::new();
        for name in ["zebra", "alpha", "mango"] {
            store.save(ScheduledJob::agent(name, "0 * * * * *", "p")).await;
        }
        let names: Vec<String> = store.list().await.into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["alpha", "mango", "zebra"]);
    }

    #[tokio::test]
    async fn update_execution_result_touches_job_row() {
        let store = InMemoryJobStore::new();
        let job = store
            .save(ScheduledJob::agent("j", "0 * * * * *", "p"))
            .await;
        store
            .update_execution_result(&job.id, ExecutionStatus::Success, "all good")
            .await;

        let job = store.get(&job.id).await.expect("job");
        assert_eq!(job.job_type, JobType::Agent);
        assert_eq!(job.last_execution_status, Some(ExecutionStatus::Success));
        assert_eq!(job.last_execution_result.as_deref(), Some("all good"));
        assert!(job.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn executions_are_newest_first_and_capped() {
        let store = InMemoryExecutionStore::new();
        for _ in 0..(MAX_EXECUTIONS_PER_JOB + 10) {
            store.save(execution("job-1", ExecutionStatus::Success)).await;
        }
        let all = store.find_by_job_id("job-1", usize::MAX).await;
        assert_eq!(all.len(), MAX_EXECUTIONS_PER_JOB);

        let limited = store.find_by_job_id("job-1", 5).await;
        assert_eq!(limited.len(), 5);
    }

    #[tokio::test]
    async fn find_by_job_id_is_scoped() {
        let store = InMemoryExecutionStore::new();
        store.save(execution("a", ExecutionStatus::Success)).await;
        store.save(execution("b", ExecutionStatus::Failed)).await;
        assert_eq!(store.find_by_job_id("a", 10).await.len(), 1);
        assert!(store.find_by_job_id("c", 10).await.is_empty());
    }
}
