use std::sync::Arc;

use super::context::{HookContext, ToolCallContext};
use super::traits::{
    AfterAgentCompleteHook, AfterToolCallHook, BeforeAgentStartHook, BeforeToolCallHook,
    HookResult, ToolCallOutcome,
};
use crate::agent::AgentResult;
use crate::error::RuntimeError;

// ─── HookRegistryBuilder ─────────────────────────────────────────────────────

/// Collects hooks of every kind; [`build`](Self::build) sorts each kind by
/// ascending `order` (stable) and drops disabled hooks, once.
#[derive(Default)]
pub struct HookRegistryBuilder {
    before_start: Vec<Arc<dyn BeforeAgentStartHook>>,
    before_tool: Vec<Arc<dyn BeforeToolCallHook>>,
    after_tool: Vec<Arc<dyn AfterToolCallHook>>,
    after_complete: Vec<Arc<dyn AfterAgentCompleteHook>>,
}

impl HookRegistryBuilder {
    pub fn before_agent_start(mut self, hook: Arc<dyn BeforeAgentStartHook>) -> Self {
        self.before_start.push(hook);
        self
    }

    pub fn before_tool_call(mut self, hook: Arc<dyn BeforeToolCallHook>) -> Self {
        self.before_tool.push(hook);
        self
    }

    pub fn after_tool_call(mut self, hook: Arc<dyn AfterToolCallHook>) -> Self {
        self.after_tool.push(hook);
        self
    }

    pub fn after_agent_complete(mut self, hook: Arc<dyn AfterAgentCompleteHook>) -> Self {
        self.after_complete.push(hook);
        self
    }

    pub fn build(mut self) -> HookRegistry {
        self.before_start.retain(|h| h.enabled());
        self.before_start.sort_by_key(|h| h.order());
        self.before_tool.retain(|h| h.enabled());
        self.before_tool.sort_by_key(|h| h.order());
        self.after_tool.retain(|h| h.enabled());
        self.after_tool.sort_by_key(|h| h.order());
        self.after_complete.retain(|h| h.enabled());
        self.after_complete.sort_by_key(|h| h.order());

        HookRegistry {
            before_start: self.before_start,
            before_tool: self.before_tool,
            after_tool: self.after_tool,
            after_complete: self.after_complete,
        }
    }
}

// ─── HookRegistry ────────────────────────────────────────────────────────────

/// Immutable, pre-sorted hook chains plus their dispatch rules.
///
/// Dispatch is strictly serial within a run.  Before-chains stop at the
/// first non-`Continue` result.  Error handling per hook:
/// `fail_on_error = true` converts the error into a rejection (before-hooks)
/// or propagates it (after-hooks); `false` logs and moves on.
/// [`RuntimeError::Cancelled`] always propagates, regardless of the flag.
pub struct HookRegistry {
    before_start: Vec<Arc<dyn BeforeAgentStartHook>>,
    before_tool: Vec<Arc<dyn BeforeToolCallHook>>,
    after_tool: Vec<Arc<dyn AfterToolCallHook>>,
    after_complete: Vec<Arc<dyn AfterAgentCompleteHook>>,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// A registry with no hooks: before-chains return `Continue`,
    /// after-chains are no-ops.
    pub fn empty() -> Self {
        HookRegistryBuilder::default().build()
    }

    pub async fn run_before_agent_start(
        &self,
        ctx: &HookContext,
    ) -> Result<HookResult, RuntimeError> {
        for hook in &self.before_start {
            match hook.before_agent_start(ctx).await {
                Ok(HookResult::Continue) => {}
                Ok(verdict) => return Ok(verdict),
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(RuntimeError::Other(reason)) => {
                    if hook.fail_on_error() {
                        return Ok(HookResult::Reject { reason });
                    }
                    tracing::warn!(error = %reason, "before-agent-start hook failed; continuing");
                }
            }
        }
        Ok(HookResult::Continue)
    }

    pub async fn run_before_tool_call(
        &self,
        ctx: &ToolCallContext,
    ) -> Result<HookResult, RuntimeError> {
        for hook in &self.before_tool {
            match hook.before_tool_call(ctx).await {
                Ok(HookResult::Continue) => {}
                Ok(verdict) => return Ok(verdict),
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(RuntimeError::Other(reason)) => {
                    if hook.fail_on_error() {
                        return Ok(HookResult::Reject { reason });
                    }
                    tracing::warn!(
                        tool = %ctx.tool_name,
                        error = %reason,
                        "before-tool-call hook failed; continuing"
                    );
                }
            }
        }
        Ok(HookResult::Continue)
    }

    pub async fn run_after_tool_call(
        &self,
        ctx: &ToolCallContext,
        outcome: &ToolCallOutcome,
    ) -> Result<(), RuntimeError> {
        for hook in &self.after_tool {
            match hook.after_tool_call(ctx, outcome).await {
                Ok(()) => {}
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(err @ RuntimeError::Other(_)) => {
                    if hook.fail_on_error() {
                        return Err(err);
                    }
                    tracing::warn!(
                        tool = %ctx.tool_name,
                        error = %err,
                        "after-tool-call hook failed; continuing"
                    );
                }
            }
        }
        Ok(())
    }

    pub async fn run_after_agent_complete(
        &self,
        ctx: &HookContext,
        result: &AgentResult,
    ) -> Result<(), RuntimeError> {
        for hook in &self.after_complete {
            match hook.after_agent_complete(ctx, result).await {
                Ok(()) => {}
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(err @ RuntimeError::Other(_)) => {
                    if hook.fail_on_error() {
                        return Err(err);
                    }
                    tracing::warn!(error = %err, "after-agent-complete hook failed; continuing");
                }
            }
        }
        Ok(())
    }
}
