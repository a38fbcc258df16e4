//! TOML configuration schema for Ringmaster.
//!
//! All sections have `#[serde(default)]` so a partially-filled
//! `config.toml` works correctly.  Missing sections fall back to their
//! `Default` impl.
//!
//! Example `~/.ringmaster/config.toml`:
//! ```toml
//! [agent]
//! default_model = "gpt-4o-mini"
//! max_tool_calls = 10
//!
//! [guard]
//! requests_per_minute = 20
//!
//! [memory]
//! max_sessions = 500
//!
//! [resilience]
//! failure_threshold = 5
//! ```

use serde::{Deserialize, Serialize};

// ─── AgentConfig ─────────────────────────────────────────────────────────────

/// Tunables for the agent executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Default model identifier used when a command does not name one.
    pub default_model: String,
    /// Maximum number of tools offered to the model per request.
    pub max_tools_per_request: usize,
    /// Global ceiling on tool invocations per run; the per-command limit is
    /// clamped to this.
    pub max_tool_calls: u32,
    /// Sampling temperature used when a command does not set one.
    pub temperature: Option<f32>,
    /// Maximum tokens per model response.  `None` uses the provider default.
    pub max_output_tokens: Option<u32>,
    /// Conversation turns kept in context (each turn is a user + assistant
    /// message pair).
    pub max_conversation_turns: usize,
    /// Bounded-semaphore size for concurrent runs.
    pub max_concurrent_requests: usize,
    /// Overall wall-clock bound for one run, in milliseconds.
    pub request_timeout_ms: u64,
    /// How long a tool call may wait for a human decision, in milliseconds.
    pub approval_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_owned(),
            max_tools_per_request: 20,
            max_tool_calls: 10,
            temperature: Some(0.7),
            max_output_tokens: Some(4096),
            max_conversation_turns: 10,
            max_concurrent_requests: 8,
            request_timeout_ms: 120_000,
            approval_timeout_ms: 60_000,
        }
    }
}

// ─── GuardConfig ─────────────────────────────────────────────────────────────

/// Tunables for the built-in guard stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Per-user request budget over a sliding minute.
    pub requests_per_minute: usize,
    /// Per-user request budget over a sliding hour.
    pub requests_per_hour: usize,
    /// Minimum trimmed prompt length.
    pub min_length: usize,
    /// Maximum trimmed prompt length.
    pub max_length: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            requests_per_hour: 200,
            min_length: 1,
            max_length: 4000,
        }
    }
}

// ─── MemoryConfig ────────────────────────────────────────────────────────────

/// Tunables for the conversation memory store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Live-session cap; least-recently-used sessions are evicted beyond it.
    pub max_sessions: usize,
    /// Per-session message cap; oldest messages are evicted beyond it.
    pub max_messages: usize,
    /// Idle-session TTL for the persistent backend, in milliseconds.
    pub ttl_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 500,
            max_messages: 50,
            ttl_ms: 86_400_000,
        }
    }
}

// ─── IdempotencyConfig ───────────────────────────────────────────────────────

/// Tunables for the write idempotency service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub enabled: bool,
    /// How long a cached write result stays valid, in seconds.
    pub ttl_secs: u64,
    /// Cache capacity; least-recently-used entries are evicted beyond it.
    pub max_entries: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

// ─── ResilienceConfig ────────────────────────────────────────────────────────

/// Tunables for the retry executor and circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Total attempts per call (the first attempt is attempt 1).
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Consecutive counted failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long a tripped breaker fast-fails, in milliseconds.
    pub open_duration_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_ms: 30_000,
            failure_threshold: 5,
            open_duration_ms: 30_000,
        }
    }
}

// ─── RagConfig ───────────────────────────────────────────────────────────────

/// Tunables for retrieval-augmented generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    pub top_k: usize,
    pub rerank_enabled: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: 5,
            rerank_enabled: false,
        }
    }
}

// ─── RingmasterConfig ────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RingmasterConfig {
    pub agent: AgentConfig,
    pub guard: GuardConfig,
    pub memory: MemoryConfig,
    pub idempotency: IdempotencyConfig,
    pub resilience: ResilienceConfig,
    pub rag: RagConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RingmasterConfig::default();
        assert!(config.agent.max_tool_calls >= 1);
        assert!(config.agent.max_concurrent_requests >= 1);
        assert!(config.guard.min_length <= config.guard.max_length);
        assert!(config.resilience.initial_backoff_ms <= config.resilience.max_backoff_ms);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: RingmasterConfig = toml::from_str(
            r#"
            [agent]
            max_tool_calls = 3

            [guard]
            requests_per_minute = 5
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.agent.max_tool_calls, 3);
        assert_eq!(config.guard.requests_per_minute, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.memory.max_messages, MemoryConfig::default().max_messages);
        assert_eq!(config.rag, RagConfig::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = RingmasterConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let back: RingmasterConfig = toml::from_str(&text).expect("parse");
        assert_eq!(config, back);
    }
}
