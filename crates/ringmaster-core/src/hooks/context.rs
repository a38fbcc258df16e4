use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

// ─── HookContext ─────────────────────────────────────────────────────────────

/// Per-run state shared between the executor and all hooks of a run.
///
/// Created at agent entry, discarded at run completion.  `tools_used` and
/// `metadata` are safe for concurrent access; snapshots never block writers.
pub struct HookContext {
    /// Unique id of this run.
    pub run_id: String,
    pub user_id: Option<String>,
    pub user_prompt: String,
    /// Arbitrary key/value state hooks may read and write.
    pub metadata: DashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    tools_used: RwLock<Vec<String>>,
}

impl HookContext {
    pub fn new(
        run_id: impl Into<String>,
        user_id: Option<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            user_id,
            user_prompt: user_prompt.into(),
            metadata: DashMap::new(),
            started_at: Utc::now(),
            tools_used: RwLock::new(Vec::new()),
        }
    }

    /// Append a tool name to the run's usage sequence.
    pub fn record_tool_use(&self, name: impl Into<String>) {
        self.tools_used.write().push(name.into());
    }

    /// Point-in-time snapshot of the tools used so far, in invocation order.
    pub fn tools_used(&self) -> Vec<String> {
        self.tools_used.read().clone()
    }
}

// ─── ToolCallContext ─────────────────────────────────────────────────────────

/// Context for one tool call within a run.
#[derive(Clone)]
pub struct ToolCallContext {
    pub agent: Arc<HookContext>,
    pub tool_name: String,
    pub tool_params: Value,
    /// Zero-based index of this call within the run.
    pub call_index: usize,
}

impl ToolCallContext {
    /// View of `tool_params` with sensitive values replaced by `"***"`.
    ///
    /// A value is masked when its key contains `password`, `apikey`,
    /// `api_key`, `token`, or `secret` (case-insensitive), at any nesting
    /// depth.
    pub fn masked_params(&self) -> Value {
        mask_value(&self.tool_params)
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "apikey", "api_key", "token", "secret"]
        .iter()
        .any(|pattern| key.contains(pattern))
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if is_sensitive_key(k) {
                        (k.clone(), Value::String("***".to_string()))
                    } else {
                        (k.clone(), mask_value(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tools_used_snapshot_preserves_order() {
        let ctx = HookContext::new("run-1", Some("u1".into()), "hi");
        ctx.record_tool_use("weather");
        ctx.record_tool_use("calculator");
        assert_eq!(ctx.tools_used(), vec!["weather", "calculator"]);
    }

    #[test]
    fn concurrent_tool_recording_loses_nothing() {
        let ctx = Arc::new(HookContext::new("run-1", None, "hi"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctx = ctx.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        ctx.record_tool_use(format!("tool-{i}-{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(ctx.tools_used().len(), 800);
    }

    #[test]
    fn metadata_is_shared_state() {
        let ctx = HookContext::new("run-1", None, "hi");
        ctx.metadata.insert("channel".into(), json!("slack"));
        assert_eq!(
            ctx.metadata.get("channel").map(|v| v.clone()),
            Some(json!("slack"))
        );
    }

    #[test]
    fn masked_params_hides_sensitive_keys() {
        let ctx = ToolCallContext {
            agent: Arc::new(HookContext::new("run-1", None, "hi")),
            tool_name: "deploy".into(),
            tool_params: json!({
                "environment": "prod",
                "apiKey": "sk-123",
                "nested": {"db_password": "hunter2", "host": "db-1"},
                "tokens": [{"access_token": "abc"}]
            }),
            call_index: 0,
        };

        let masked = ctx.masked_params();
        assert_eq!(masked["environment"], json!("prod"));
        assert_eq!(masked["apiKey"], json!("***"));
        assert_eq!(masked["nested"]["db_password"], json!("***"));
        assert_eq!(masked["nested"]["host"], json!("db-1"));
        assert_eq!(masked["tokens"][0]["access_token"], json!("***"));
        // The original params are untouched.
        assert_eq!(ctx.tool_params["apiKey"], json!("sk-123"));
    }
}
