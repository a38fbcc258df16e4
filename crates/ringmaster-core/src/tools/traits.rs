use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output fed back to the model.
    pub output: String,
    /// Whether the tool considered the execution successful.
    pub success: bool,
    /// Optional structured metadata for machine consumption.
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            metadata: None,
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A capability the agent executor (or a scheduled job) can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.  `call` may suspend; the executor bounds it
/// with its per-attempt timeout.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"weather"`.
    fn name(&self) -> &str;

    /// Human-readable description included in LLM tool payloads.
    fn description(&self) -> &str;

    /// JSON Schema object describing the tool's accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn call(&self, args: Value) -> Result<ToolResult, String>;
}

/// Summary of a registered tool, suitable for inclusion in LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}
