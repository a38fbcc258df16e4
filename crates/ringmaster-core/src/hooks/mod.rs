//! Lifecycle hook framework.
//!
//! Hooks are ordered, cooperative extension points that run *inside* the
//! execution pipeline (unlike guards, which gate admission):
//!
//! | Kind                  | Runs                     | Can veto? |
//! |-----------------------|--------------------------|-----------|
//! | `BeforeAgentStart`    | after guard, before LLM  | yes       |
//! | `BeforeToolCall`      | before each tool invoke  | yes       |
//! | `AfterToolCall`       | after each tool invoke   | no        |
//! | `AfterAgentComplete`  | after the final result   | no        |
//!
//! Every hook carries `order` / `enabled` / `fail_on_error` metadata.  A
//! failing hook either converts to a rejection (`fail_on_error = true`) or
//! is logged and skipped (fail-open).  Cancellation is never subject to
//! `fail_on_error`: it always propagates.

mod context;
mod registry;
mod traits;

pub use context::{HookContext, ToolCallContext};
pub use registry::{HookRegistry, HookRegistryBuilder};
pub use traits::{
    AfterAgentCompleteHook, AfterToolCallHook, BeforeAgentStartHook, BeforeToolCallHook,
    HookResult, ToolCallOutcome,
};
