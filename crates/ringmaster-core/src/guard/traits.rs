use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;

// ─── GuardCommand ────────────────────────────────────────────────────────────

/// The request presented to the guard pipeline.
#[derive(Debug, Clone)]
pub struct GuardCommand {
    pub user_id: String,
    pub text: String,
    pub metadata: HashMap<String, Value>,
}

impl GuardCommand {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            metadata: HashMap::new(),
        }
    }
}

// ─── GuardResult ─────────────────────────────────────────────────────────────

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardCategory {
    RateLimited,
    InvalidInput,
    PromptInjection,
    Unauthorized,
}

/// Outcome of evaluating the pipeline (or a single stage).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardResult {
    /// The request may proceed.
    Allowed,
    /// The request is rejected; later stages are not consulted.
    Rejected {
        reason: String,
        category: GuardCategory,
        /// Name of the stage that rejected.
        stage: String,
    },
}

impl GuardResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// ─── GuardStage trait ────────────────────────────────────────────────────────

/// One policy check in the admission pipeline.
///
/// Stages are evaluated in ascending [`order`](GuardStage::order); ties are
/// unspecified.  A stage error propagates to the executor's error boundary —
/// the pipeline does not catch it.
#[async_trait]
pub trait GuardStage: Send + Sync {
    /// Stage name, echoed in rejections and logs.
    fn name(&self) -> &str;

    /// Position in the pipeline; lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    async fn check(&self, command: &GuardCommand) -> Result<GuardResult, RuntimeError>;
}
