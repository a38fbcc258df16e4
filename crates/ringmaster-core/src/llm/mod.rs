//! LLM chat-client seam.
//!
//! The executor talks to model providers exclusively through [`ChatClient`];
//! concrete OpenAI/Anthropic/self-hosted adapters live in the embedding
//! application and implement the trait over their own HTTP stacks.

mod traits;
mod types;

pub use traits::{ChatClient, ChatStream, Result};
pub(crate) use types::assemble_tool_calls;
pub use types::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatRole, TokenUsage, ToolCall,
    ToolCallDelta,
};
