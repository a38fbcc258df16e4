use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use super::types::{ChatChunk, ChatRequest, ChatResponse};

/// Result type for chat-client operations.
///
/// The error side is the provider's raw message; the executor classifies it
/// by substring inspection ("rate limit", "timeout", "context length", …).
pub type Result<T> = std::result::Result<T, String>;

/// Type alias for a streaming chat response.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Trait for LLM chat providers.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn ChatClient>` across concurrent agent runs, and must honor task
/// cancellation: dropping the returned future aborts the in-flight request.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one chat completion and return the full response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Stream a chat completion as incremental chunks.
    ///
    /// Tool calls arrive as partial [`ToolCallDelta`](super::ToolCallDelta)s
    /// that the consumer accumulates by index.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Provider name used in logs and breaker endpoint keys.
    fn provider_name(&self) -> &str;
}
