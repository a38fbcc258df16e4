use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{ChatMessage, TokenUsage};

// ─── AgentMode ───────────────────────────────────────────────────────────────

/// How the executor drives the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Single completion, no tools.
    Standard,
    /// Full LLM ⇄ tool loop.
    #[default]
    React,
    /// Same loop, token-streamed output with tool markers.
    Streaming,
}

// ─── AgentCommand ────────────────────────────────────────────────────────────

/// Input to the executor.  `user_prompt` must be non-empty.
///
/// Well-known `metadata` keys: `session_id` selects the memory session;
/// `channel`, `entrypoint`, and `source` are informational and feed the
/// tool policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    pub user_prompt: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub mode: AgentMode,
    /// Per-run tool-invocation budget; clamped to the global maximum.
    pub max_tool_calls: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub model: Option<String>,
    /// When non-empty this history is used verbatim and memory is not
    /// consulted.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentCommand {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: String::new(),
            user_id: None,
            mode: AgentMode::default(),
            max_tool_calls: 10,
            temperature: None,
            model: None,
            conversation_history: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_session_id(self, session_id: impl Into<String>) -> Self {
        self.with_metadata("session_id", Value::String(session_id.into()))
    }

    pub fn with_channel(self, channel: impl Into<String>) -> Self {
        self.with_metadata("channel", Value::String(channel.into()))
    }

    /// The memory session selected by this command, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.metadata.get("session_id").and_then(Value::as_str)
    }

    /// The invocation channel (`slack`, `web`, `scheduler`, …).
    pub fn channel(&self) -> Option<&str> {
        self.metadata.get("channel").and_then(Value::as_str)
    }
}

// ─── ErrorCode ───────────────────────────────────────────────────────────────

/// Normalized failure taxonomy surfaced on [`AgentResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    GuardRejected,
    RateLimited,
    Timeout,
    ContextTooLong,
    ToolError,
    PendingApproval,
    Unknown,
}

// ─── AgentResult ─────────────────────────────────────────────────────────────

/// Outcome of one run.
///
/// Invariant: `success == true` ⇔ `error_code.is_none()` ⇔
/// `content.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub content: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    /// Names of the tools invoked, in order.
    pub tools_used: Vec<String>,
    pub token_usage: Option<TokenUsage>,
    pub duration_ms: u64,
}

impl AgentResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error_code: None,
            error_message: None,
            tools_used: Vec::new(),
            token_usage: None,
            duration_ms: 0,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            tools_used: Vec::new(),
            token_usage: None,
            duration_ms: 0,
        }
    }

    pub fn with_tools_used(mut self, tools_used: Vec<String>) -> Self {
        self.tools_used = tools_used;
        self
    }

    pub fn with_token_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
