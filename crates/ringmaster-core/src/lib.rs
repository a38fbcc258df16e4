//! Core runtime of the Ringmaster AI-agent orchestration platform.
//!
//! Ringmaster turns a user utterance — from chat, slash command, HTTP, or a
//! scheduled job — into a bounded sequence of model calls and tool
//! invocations:
//!
//! ```text
//! caller ──▶ AgentExecutor::execute(cmd)
//!               │
//!               ▼
//!        GuardPipeline (rate limit / validation / injection)
//!               │
//!               ▼
//!        BeforeAgentStart hooks ──▶ history + retrieval context
//!               │
//!               ▼
//!        ReAct loop { LLM ⇄ tools }          ── policy / approval /
//!               │                               idempotency per tool call
//!               ▼
//!        AfterAgentComplete hooks ──▶ AgentResult
//! ```
//!
//! Channel gateways, dashboards, and wiring glue live outside this crate;
//! every collaborator (chat client, tools, memory, personas, notifier sinks)
//! is a trait seam constructed by the embedding application.

pub mod agent;
pub mod approval;
pub mod config;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod idempotency;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod persona;
pub mod policy;
pub mod rag;
pub mod resilience;
pub mod scheduler;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types.
///
/// ```rust
/// use ringmaster_core::prelude::*;
/// ```
pub mod prelude {
    // Agent executor
    pub use crate::agent::{
        AgentCommand, AgentExecutor, AgentMode, AgentResult, CancellationSignal, ErrorCode,
    };

    // LLM seam
    pub use crate::llm::{ChatClient, ChatMessage, ChatRequest, ChatResponse, ChatRole, TokenUsage};

    // Tool system
    pub use crate::tools::{Tool, ToolRegistry, ToolResult, ToolSpec};

    // Guard pipeline
    pub use crate::guard::{GuardCommand, GuardPipeline, GuardResult, GuardStage};

    // Hooks
    pub use crate::hooks::{HookContext, HookRegistry, HookResult, ToolCallContext};

    // Memory
    pub use crate::memory::{ConversationMemory, MemoryMessage, MemoryStore};

    // Approvals & policy
    pub use crate::approval::{ApprovalResponse, ApprovalStore};
    pub use crate::policy::{PolicyDecision, ToolPolicy};

    // Resilience
    pub use crate::resilience::{CircuitBreaker, OutboundError, RetryExecutor, RetryPolicy};

    // Scheduler
    pub use crate::scheduler::{JobType, ScheduledJob, SchedulerRunner, SchedulerService};

    // Configuration
    pub use crate::config::{RingmasterConfig, load_default_config};

    // Errors
    pub use crate::error::RuntimeError;
}
