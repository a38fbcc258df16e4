use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── JobType ─────────────────────────────────────────────────────────────────

/// What a job does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Invoke one registered tool with fixed arguments.
    McpTool,
    /// Run a full agent turn with a configured prompt.
    Agent,
}

// ─── ScheduledJob ────────────────────────────────────────────────────────────

/// A persisted job definition.
///
/// Invariants enforced at save time: `cron_expression` parses,
/// `timezone` is a valid IANA zone, [`JobType::McpTool`] jobs carry
/// `mcp_server_name` + `tool_name`, [`JobType::Agent`] jobs carry
/// `agent_prompt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Six-field (with seconds) or five-field cron expression.
    pub cron_expression: String,
    /// IANA zone the expression is evaluated in (e.g. `"Asia/Seoul"`).
    pub timezone: String,
    pub job_type: JobType,

    // McpTool fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_arguments: Option<Value>,

    // Agent fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_max_tool_calls: Option<u32>,

    // Notification sinks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams_webhook_url: Option<String>,

    // Execution wrapper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default)]
    pub max_retry_count: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // Last non-dry-run outcome (maintained by the scheduler).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledJob {
    /// A tool job with the common fields filled in.
    pub fn mcp_tool(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        mcp_server_name: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            cron_expression: cron_expression.into(),
            timezone: "UTC".to_string(),
            job_type: JobType::McpTool,
            mcp_server_name: Some(mcp_server_name.into()),
            tool_name: Some(tool_name.into()),
            tool_arguments: None,
            agent_prompt: None,
            persona_id: None,
            agent_system_prompt: None,
            agent_model: None,
            agent_max_tool_calls: None,
            slack_channel_id: None,
            teams_webhook_url: None,
            execution_timeout_ms: None,
            retry_on_failure: false,
            max_retry_count: 0,
            enabled: true,
            last_execution_status: None,
            last_execution_result: None,
            last_executed_at: None,
        }
    }

    /// An agent job with the common fields filled in.
    pub fn agent(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        agent_prompt: impl Into<String>,
    ) -> Self {
        Self {
            job_type: JobType::Agent,
            mcp_server_name: None,
            tool_name: None,
            agent_prompt: Some(agent_prompt.into()),
            ..Self::mcp_tool(name, cron_expression, "", "")
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_tool_arguments(mut self, arguments: Value) -> Self {
        self.tool_arguments = Some(arguments);
        self
    }

    pub fn with_execution_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.execution_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retries(mut self, max_retry_count: u32) -> Self {
        self.retry_on_failure = true;
        self.max_retry_count = max_retry_count;
        self
    }

    pub fn with_slack_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.slack_channel_id = Some(channel_id.into());
        self
    }

    pub fn with_teams_webhook(mut self, webhook_url: impl Into<String>) -> Self {
        self.teams_webhook_url = Some(webhook_url.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ─── ExecutionStatus / ScheduledJobExecution ─────────────────────────────────

/// Outcome of a single job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

/// Record of one job run (dry runs included).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobExecution {
    pub id: String,
    pub job_id: String,
    pub job_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

// ─── Validation helpers ──────────────────────────────────────────────────────

/// Parse a cron expression, accepting both six-field (with seconds) and
/// five-field POSIX forms; five-field expressions get a `"0 "` seconds
/// prefix.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule, String> {
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| format!("invalid cron expression '{expression}': {e}"))
}

/// Validate an IANA timezone name.
pub fn validate_timezone(timezone: &str) -> Result<chrono_tz::Tz, String> {
    timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| format!("invalid timezone '{timezone}'"))
}
