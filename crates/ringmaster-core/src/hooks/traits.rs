use std::time::Duration;

use async_trait::async_trait;

use super::context::{HookContext, ToolCallContext};
use crate::agent::AgentResult;
use crate::error::RuntimeError;

// ─── HookResult ──────────────────────────────────────────────────────────────

/// Verdict returned by before-hooks.
///
/// Rejections are values, not errors: a hook that wants to veto returns
/// [`HookResult::Reject`]; only genuine failures use the `Err` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    /// Proceed to the next hook (or the guarded operation).
    Continue,
    /// Veto the operation with a reason.
    Reject { reason: String },
    /// Suspend the operation pending a human decision.
    PendingApproval { message: String },
}

/// What happened when a tool was invoked, passed to after-tool hooks.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub success: bool,
    pub output: String,
    pub duration: Duration,
}

// ─── Hook traits ─────────────────────────────────────────────────────────────
//
// Each hook kind is a single-method interface plus the same three metadata
// knobs: `order` (lower runs earlier), `enabled` (disabled hooks are dropped
// when the registry is built), and `fail_on_error` (`true`: an error in the
// hook rejects/fails the run; `false`: the error is logged and the chain
// continues).  Cancellation ignores `fail_on_error` and always propagates.

/// Runs after guard admission, before the first model call.
#[async_trait]
pub trait BeforeAgentStartHook: Send + Sync {
    fn order(&self) -> i32 {
        0
    }
    fn enabled(&self) -> bool {
        true
    }
    fn fail_on_error(&self) -> bool {
        false
    }

    async fn before_agent_start(&self, ctx: &HookContext) -> Result<HookResult, RuntimeError>;
}

/// Runs before each tool invocation.
#[async_trait]
pub trait BeforeToolCallHook: Send + Sync {
    fn order(&self) -> i32 {
        0
    }
    fn enabled(&self) -> bool {
        true
    }
    fn fail_on_error(&self) -> bool {
        false
    }

    async fn before_tool_call(&self, ctx: &ToolCallContext) -> Result<HookResult, RuntimeError>;
}

/// Runs after each tool invocation (skipped when the call was vetoed).
#[async_trait]
pub trait AfterToolCallHook: Send + Sync {
    fn order(&self) -> i32 {
        0
    }
    fn enabled(&self) -> bool {
        true
    }
    fn fail_on_error(&self) -> bool {
        false
    }

    async fn after_tool_call(
        &self,
        ctx: &ToolCallContext,
        outcome: &ToolCallOutcome,
    ) -> Result<(), RuntimeError>;
}

/// Runs once per run, after the result has been assembled.
#[async_trait]
pub trait AfterAgentCompleteHook: Send + Sync {
    fn order(&self) -> i32 {
        0
    }
    fn enabled(&self) -> bool {
        true
    }
    fn fail_on_error(&self) -> bool {
        false
    }

    async fn after_agent_complete(
        &self,
        ctx: &HookContext,
        result: &AgentResult,
    ) -> Result<(), RuntimeError>;
}
