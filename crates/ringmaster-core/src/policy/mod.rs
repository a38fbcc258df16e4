//! Tool execution policy engine.
//!
//! A pure classifier consulted on every tool call — by the agent executor
//! before invoking a tool, and directly by the scheduler for MCP-tool jobs.
//! It never performs I/O; enforcement (synthesizing rejections, parking on
//! the approval store) is the caller's job.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

/// Decision returned by [`ToolPolicy::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The tool call may proceed immediately.
    Allow,
    /// The tool call is prohibited; the reason explains why.
    Reject { reason: String },
    /// The tool call needs a human decision before proceeding.
    RequireApproval,
}

/// Predicate flagging argument patterns that require approval,
/// e.g. refunds above a threshold.  Receives `(tool_name, args)`.
pub type ApprovalPredicate = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

/// Channel- and classification-based execution rules for tools.
pub struct ToolPolicy {
    write_tools: HashSet<String>,
    deny_write_channels: HashSet<String>,
    deny_write_message: String,
    approval_required_tools: HashSet<String>,
    approval_predicates: Vec<ApprovalPredicate>,
}

impl ToolPolicy {
    pub fn new() -> Self {
        Self {
            write_tools: HashSet::new(),
            deny_write_channels: HashSet::new(),
            deny_write_message: "Write tools are not allowed on this channel".to_string(),
            approval_required_tools: HashSet::new(),
            approval_predicates: Vec::new(),
        }
    }

    /// Classify tools as writes (side-effecting).
    pub fn with_write_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_tools.extend(names.into_iter().map(Into::into));
        self
    }

    /// Channels on which write tools are denied outright.
    pub fn with_deny_write_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_write_channels
            .extend(channels.into_iter().map(Into::into));
        self
    }

    /// Message carried by write-denial rejections.
    pub fn with_deny_write_message(mut self, message: impl Into<String>) -> Self {
        self.deny_write_message = message.into();
        self
    }

    /// Tools that always require human approval.
    pub fn with_approval_required_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.approval_required_tools
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Register an argument predicate that escalates matching calls to
    /// approval.
    pub fn with_approval_predicate(mut self, predicate: ApprovalPredicate) -> Self {
        self.approval_predicates.push(predicate);
        self
    }

    /// `true` when the named tool is classified as a write.
    pub fn is_write_tool(&self, name: &str) -> bool {
        self.write_tools.contains(name)
    }

    /// Evaluate one tool call against the policy.
    ///
    /// Rule order: write/channel denial first, then approval classification
    /// (named set or any matching predicate), then allow.
    pub fn evaluate(&self, name: &str, args: &Value, channel: &str) -> PolicyDecision {
        if self.write_tools.contains(name) && self.deny_write_channels.contains(channel) {
            return PolicyDecision::Reject {
                reason: self.deny_write_message.clone(),
            };
        }

        if self.approval_required_tools.contains(name)
            || self.approval_predicates.iter().any(|p| p(name, args))
        {
            return PolicyDecision::RequireApproval;
        }

        PolicyDecision::Allow
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolPolicy")
            .field("write_tools", &self.write_tools)
            .field("deny_write_channels", &self.deny_write_channels)
            .field("approval_required_tools", &self.approval_required_tools)
            .field("approval_predicates", &self.approval_predicates.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> ToolPolicy {
        ToolPolicy::new()
            .with_write_tools(["create_ticket", "refund"])
            .with_deny_write_channels(["web"])
            .with_deny_write_message("writes are disabled on the web channel")
            .with_approval_required_tools(["refund"])
    }

    #[test]
    fn write_tool_denied_on_deny_channel() {
        let decision = policy().evaluate("create_ticket", &json!({}), "web");
        assert_eq!(
            decision,
            PolicyDecision::Reject {
                reason: "writes are disabled on the web channel".to_string()
            }
        );
    }

    #[test]
    fn write_tool_allowed_on_other_channel() {
        let decision = policy().evaluate("create_ticket", &json!({}), "slack");
        assert_eq!(decision, PolicyDecision::Allow);
    }

    #[test]
    fn write_denial_takes_precedence_over_approval() {
        // refund is both a write tool and approval-required; on a denied
        // channel the denial wins.
        let decision = policy().evaluate("refund", &json!({}), "web");
        assert!(matches!(decision, PolicyDecision::Reject { .. }));
    }

    #[test]
    fn approval_required_by_name() {
        let decision = policy().evaluate("refund", &json!({}), "slack");
        assert_eq!(decision, PolicyDecision::RequireApproval);
    }

    #[test]
    fn approval_required_by_predicate() {
        let policy = ToolPolicy::new().with_approval_predicate(Arc::new(|name, args| {
            name == "transfer" && args.get("amount").and_then(Value::as_u64).unwrap_or(0) > 1000
        }));

        assert_eq!(
            policy.evaluate("transfer", &json!({"amount": 5000}), "slack"),
            PolicyDecision::RequireApproval
        );
        assert_eq!(
            policy.evaluate("transfer", &json!({"amount": 10}), "slack"),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn read_tool_allowed_everywhere() {
        assert_eq!(policy().evaluate("weather", &json!({}), "web"), PolicyDecision::Allow);
        assert_eq!(
            policy().evaluate("weather", &json!({}), "scheduler"),
            PolicyDecision::Allow
        );
    }
}
