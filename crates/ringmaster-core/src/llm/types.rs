use serde::{Deserialize, Serialize};

use crate::tools::ToolSpec;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    /// A tool-response message, keyed by `tool_call_id`.
    Tool,
}

/// A model-issued request to execute a named tool with JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Provider-assigned call id; echoed back on the tool-response message.
    pub id: String,
    /// Tool name as registered in the [`ToolRegistry`](crate::tools::ToolRegistry).
    pub name: String,
    /// Raw JSON text of the arguments (parsed by the executor).
    pub arguments: String,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls attached to an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For [`ChatRole::Tool`] messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant turn that carries pending tool calls.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool-response message answering the call with the given id.
    pub fn tool_response(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Request for one chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier (e.g. `"gpt-4o"`, `"claude-sonnet-4.5"`).
    pub model: String,

    /// System prompt, possibly empty.
    pub system_prompt: String,

    /// The conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Tools the model may call this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    /// Sampling temperature (0.0 – 2.0).  `None` uses the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            system_prompt: String::new(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from one chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text, possibly empty when the model only calls tools.
    pub content: String,

    /// Tool calls requested by the model, in the order it returned them.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Token usage for this call.
    pub usage: Option<TokenUsage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Sum two usages field-wise (for accumulating across loop iterations).
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A partial tool call inside a streaming response.
///
/// Providers emit tool calls incrementally; deltas with the same `index`
/// belong to one call and are concatenated by the consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments_delta: String,
}

/// A chunk of a streaming chat response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Incremental text for this chunk (may be empty).
    #[serde(default)]
    pub delta: String,

    /// Partial tool-call data carried by this chunk.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallDelta>,

    /// Usage totals, typically only present on the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Whether this is the final chunk of the completion.
    #[serde(default)]
    pub is_final: bool,
}

/// Fold a sequence of [`ToolCallDelta`]s into complete [`ToolCall`]s,
/// ordered by delta index.
pub(crate) fn assemble_tool_calls(deltas: &[ToolCallDelta]) -> Vec<ToolCall> {
    let mut slots: Vec<(Option<String>, Option<String>, String)> = Vec::new();
    for d in deltas {
        if slots.len() <= d.index {
            slots.resize_with(d.index + 1, Default::default);
        }
        let slot = &mut slots[d.index];
        if let Some(id) = &d.id {
            slot.0 = Some(id.clone());
        }
        if let Some(name) = &d.name {
            slot.1 = Some(name.clone());
        }
        slot.2.push_str(&d.arguments_delta);
    }
    slots
        .into_iter()
        .filter_map(|(id, name, arguments)| {
            Some(ToolCall {
                id: id.unwrap_or_default(),
                name: name?,
                arguments,
            })
        })
        .collect()
}
