use std::sync::Arc;

use super::traits::{GuardCommand, GuardResult, GuardStage};
use crate::error::RuntimeError;

/// Ordered, short-circuiting chain of [`GuardStage`]s.
///
/// Stages are stable-sorted by [`GuardStage::order`] once at construction.
pub struct GuardPipeline {
    stages: Vec<Arc<dyn GuardStage>>,
}

impl GuardPipeline {
    pub fn new(mut stages: Vec<Arc<dyn GuardStage>>) -> Self {
        stages.sort_by_key(|s| s.order());
        Self { stages }
    }

    /// Evaluate all stages in order, stopping at the first rejection.
    pub async fn evaluate(&self, command: &GuardCommand) -> Result<GuardResult, RuntimeError> {
        for stage in &self.stages {
            match stage.check(command).await? {
                GuardResult::Allowed => {}
                rejected @ GuardResult::Rejected { .. } => {
                    if let GuardResult::Rejected { reason, stage, .. } = &rejected {
                        tracing::info!(stage = %stage, reason = %reason, "guard rejected request");
                    }
                    return Ok(rejected);
                }
            }
        }
        Ok(GuardResult::Allowed)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
