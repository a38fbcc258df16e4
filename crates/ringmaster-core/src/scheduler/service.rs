//! `SchedulerService` — job CRUD with validation, and the execution wrapper
//! applied on every firing (manual, timer, or dry-run).
//!
//! ## Execution wrapper
//! ```text
//! load job ──▶ [timer firing: skip when disabled]
//!       │
//!       ▼
//! attempt loop (retry_on_failure → max_retry_count total attempts)
//!   └─ body bounded by execution_timeout_ms ("… timed out")
//!       │
//!       ▼
//! record ScheduledJobExecution {status, duration, dry_run, result|error}
//!       │
//!       ├─ non-dry-run: update job's last-execution fields
//!       └─ non-dry-run success: Slack / Teams notification
//! ```
//!
//! Job errors never propagate to the trigger source; they are recorded as
//! FAILED executions.  Notification failures only produce a warning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use super::stores::{ExecutionStore, JobStore};
use super::types::{
    ExecutionStatus, JobType, ScheduledJob, ScheduledJobExecution, parse_cron, validate_timezone,
};
use crate::agent::{AgentCommand, AgentExecutor};
use crate::error::RuntimeError;
use crate::notify::{SlackMessageSender, TeamsMessageSender};
use crate::persona::PersonaStore;
use crate::policy::{PolicyDecision, ToolPolicy};
use crate::tools::ToolRegistry;

/// Fallback system prompt when neither the job nor a persona provides one.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

// ─── SchedulerError ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Validation failure on create/update; the store was not touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("job not found: {0}")]
    NotFound(String),
}

// ─── SchedulerService ────────────────────────────────────────────────────────

/// Validates, persists, and executes [`ScheduledJob`]s.  Collaborators are
/// all optional; a missing one yields a structured failure message on the
/// execution record instead of an error.
pub struct SchedulerService {
    jobs: Arc<dyn JobStore>,
    executions: Arc<dyn ExecutionStore>,
    executor: Option<Arc<AgentExecutor>>,
    tools: Option<Arc<ToolRegistry>>,
    personas: Option<Arc<dyn PersonaStore>>,
    policy: Option<Arc<ToolPolicy>>,
    slack: Option<Arc<dyn SlackMessageSender>>,
    teams: Option<Arc<dyn TeamsMessageSender>>,
}

impl SchedulerService {
    pub fn new(jobs: Arc<dyn JobStore>, executions: Arc<dyn ExecutionStore>) -> Self {
        Self {
            jobs,
            executions,
            executor: None,
            tools: None,
            personas: None,
            policy: None,
            slack: None,
            teams: None,
        }
    }

    pub fn with_agent_executor(mut self, executor: Arc<AgentExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_tool_registry(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_persona_store(mut self, personas: Arc<dyn PersonaStore>) -> Self {
        self.personas = Some(personas);
        self
    }

    pub fn with_policy(mut self, policy: Arc<ToolPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_slack_sender(mut self, slack: Arc<dyn SlackMessageSender>) -> Self {
        self.slack = Some(slack);
        self
    }

    pub fn with_teams_sender(mut self, teams: Arc<dyn TeamsMessageSender>) -> Self {
        self.teams = Some(teams);
        self
    }

    // ── CRUD ──────────────────────────────────────────────────────────────────

    /// Validate and persist a new job.
    pub async fn create(&self, job: ScheduledJob) -> Result<ScheduledJob, SchedulerError> {
        validate_job(&job)?;
        let job = self.jobs.save(job).await;
        tracing::info!(job_id = %job.id, name = %job.name, "scheduled job created");
        Ok(job)
    }

    /// Validate and replace an existing job.
    pub async fn update(
        &self,
        id: &str,
        mut job: ScheduledJob,
    ) -> Result<ScheduledJob, SchedulerError> {
        if self.jobs.get(id).await.is_none() {
            return Err(SchedulerError::NotFound(id.to_string()));
        }
        validate_job(&job)?;
        job.id = id.to_string();
        Ok(self.jobs.save(job).await)
    }

    /// Delete a job.  Returns `true` when it existed.
    pub async fn delete(&self, id: &str) -> bool {
        self.jobs.delete(id).await
    }

    pub async fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.get(id).await
    }

    pub async fn list(&self) -> Vec<ScheduledJob> {
        self.jobs.list().await
    }

    /// Execution history for one job, newest first.
    pub async fn get_executions(&self, job_id: &str, limit: usize) -> Vec<ScheduledJobExecution> {
        self.executions.find_by_job_id(job_id, limit).await
    }

    // ── Firing ────────────────────────────────────────────────────────────────

    /// Manually fire a job now (runs even when disabled).
    pub async fn trigger(&self, id: &str) -> Result<ScheduledJobExecution, SchedulerError> {
        let job = self
            .jobs
            .get(id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        Ok(self.run_job(&job, false).await)
    }

    /// Evaluate a job's body with persistence of the job row and all
    /// notifications suppressed.  The execution record is still written,
    /// flagged `dry_run = true`.
    pub async fn dry_run(&self, id: &str) -> Result<ScheduledJobExecution, SchedulerError> {
        let job = self
            .jobs
            .get(id)
            .await
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        Ok(self.run_job(&job, true).await)
    }

    /// Timer-firing entry point: disabled jobs are skipped.
    pub(super) async fn run_scheduled(&self, id: &str) {
        let Some(job) = self.jobs.get(id).await else {
            tracing::warn!(job_id = %id, "timer fired for a deleted job");
            return;
        };
        if !job.enabled {
            tracing::debug!(job_id = %id, "skipping disabled job");
            return;
        }
        self.run_job(&job, false).await;
    }

    async fn run_job(&self, job: &ScheduledJob, dry_run: bool) -> ScheduledJobExecution {
        let started_at = Utc::now();
        let started = Instant::now();
        tracing::info!(job_id = %job.id, name = %job.name, dry_run, "job firing");

        let total_attempts = if job.retry_on_failure {
            job.max_retry_count.max(1)
        } else {
            1
        };

        let mut outcome: Result<String, String> = Err("job did not run".to_string());
        for attempt in 1..=total_attempts {
            outcome = self.run_body_with_timeout(job).await;
            match &outcome {
                Ok(_) => break,
                Err(error) => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        total_attempts,
                        %error,
                        "job attempt failed"
                    );
                }
            }
        }

        let (status, result, error_message) = match outcome {
            Ok(result) => (ExecutionStatus::Success, Some(result), None),
            Err(error) => (ExecutionStatus::Failed, None, Some(error)),
        };

        let execution = self
            .executions
            .save(ScheduledJobExecution {
                id: Uuid::new_v4().to_string(),
                job_id: job.id.clone(),
                job_name: job.name.clone(),
                status,
                started_at,
                finished_at: Some(Utc::now()),
                duration_ms: started.elapsed().as_millis() as u64,
                dry_run,
                result: result.clone(),
                error_message: error_message.clone(),
            })
            .await;

        if !dry_run {
            let summary = result
                .as_deref()
                .or(error_message.as_deref())
                .unwrap_or_default();
            self.jobs
                .update_execution_result(&job.id, status, summary)
                .await;

            if status == ExecutionStatus::Success {
                self.notify(job, result.as_deref().unwrap_or_default()).await;
            }
        }

        execution
    }

    async fn run_body_with_timeout(&self, job: &ScheduledJob) -> Result<String, String> {
        match job.execution_timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), self.run_body(job))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(format!(
                        "job '{}' timed out after {timeout_ms}ms",
                        job.name
                    )),
                }
            }
            None => self.run_body(job).await,
        }
    }

    async fn run_body(&self, job: &ScheduledJob) -> Result<String, String> {
        match job.job_type {
            JobType::McpTool => self.run_tool_body(job).await,
            JobType::Agent => self.run_agent_body(job).await,
        }
    }

    async fn run_tool_body(&self, job: &ScheduledJob) -> Result<String, String> {
        let registry = self
            .tools
            .as_ref()
            .ok_or_else(|| "ToolRegistry not available".to_string())?;
        let tool_name = job
            .tool_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| "toolName required".to_string())?;
        let tool = registry
            .get(tool_name)
            .ok_or_else(|| format!("Tool '{tool_name}' not found"))?;

        let args = job.tool_arguments.clone().unwrap_or_else(|| json!({}));
        if let Some(policy) = &self.policy {
            match policy.evaluate(tool_name, &args, "scheduler") {
                PolicyDecision::Allow => {}
                PolicyDecision::Reject { reason } => return Err(reason),
                PolicyDecision::RequireApproval => {
                    return Err(format!(
                        "Tool '{tool_name}' requires approval and cannot run unattended"
                    ));
                }
            }
        }

        match tool.call(args).await {
            Ok(result) if result.success => Ok(result.output),
            Ok(result) => Err(result.output),
            Err(error) => Err(error),
        }
    }

    async fn run_agent_body(&self, job: &ScheduledJob) -> Result<String, String> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| "AgentExecutor not available".to_string())?;
        let prompt = job
            .agent_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or_else(|| "agentPrompt required".to_string())?;

        let system_prompt = self.resolve_system_prompt(job).await;
        let mut cmd = AgentCommand::new(prompt)
            .with_user_id("scheduler")
            .with_system_prompt(system_prompt)
            .with_channel("scheduler")
            .with_metadata("entrypoint", Value::String("scheduler".to_string()));
        if let Some(model) = &job.agent_model {
            cmd = cmd.with_model(model.clone());
        }
        if let Some(max_tool_calls) = job.agent_max_tool_calls {
            cmd = cmd.with_max_tool_calls(max_tool_calls);
        }

        match executor.execute(cmd).await {
            Ok(result) if result.success => Ok(result.content.unwrap_or_default()),
            Ok(result) => Err(result
                .error_message
                .unwrap_or_else(|| "agent run failed".to_string())),
            Err(RuntimeError::Cancelled) => Err("cancelled".to_string()),
            Err(RuntimeError::Other(raw)) => Err(raw),
        }
    }

    /// System-prompt precedence: job override > named persona > default
    /// persona > built-in default.
    async fn resolve_system_prompt(&self, job: &ScheduledJob) -> String {
        if let Some(prompt) = &job.agent_system_prompt
            && !prompt.trim().is_empty()
        {
            return prompt.clone();
        }
        if let Some(personas) = &self.personas {
            if let Some(persona_id) = &job.persona_id
                && let Some(persona) = personas.get(persona_id).await
            {
                return persona.system_prompt;
            }
            if let Some(persona) = personas.get_default().await {
                return persona.system_prompt;
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }

    async fn notify(&self, job: &ScheduledJob, result: &str) {
        let text = match job.job_type {
            JobType::McpTool => format!("**[{}]**\n```\n{}\n```", job.name, result),
            JobType::Agent => format!("**[{}]** 브리핑:\n{}", job.name, result),
        };

        if let (Some(slack), Some(channel_id)) = (&self.slack, &job.slack_channel_id)
            && let Err(error) = slack.send(channel_id, &text).await
        {
            tracing::warn!(job_id = %job.id, %error, "slack notification failed");
        }
        if let (Some(teams), Some(webhook_url)) = (&self.teams, &job.teams_webhook_url)
            && let Err(error) = teams.send(webhook_url, &text).await
        {
            tracing::warn!(job_id = %job.id, %error, "teams notification failed");
        }
    }
}

// ─── Validation ──────────────────────────────────────────────────────────────

fn validate_job(job: &ScheduledJob) -> Result<(), SchedulerError> {
    parse_cron(&job.cron_expression).map_err(SchedulerError::InvalidArgument)?;
    validate_timezone(&job.timezone).map_err(SchedulerError::InvalidArgument)?;

    match job.job_type {
        JobType::McpTool => {
            if job
                .mcp_server_name
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
            {
                return Err(SchedulerError::InvalidArgument(
                    "mcpServerName required for MCP tool jobs".to_string(),
                ));
            }
            if job.tool_name.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(SchedulerError::InvalidArgument(
                    "toolName required for MCP tool jobs".to_string(),
                ));
            }
        }
        JobType::Agent => {
            if job
                .agent_prompt
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
            {
                return Err(SchedulerError::InvalidArgument(
                    "agentPrompt required for agent jobs".to_string(),
                ));
            }
        }
    }
    Ok(())
}
