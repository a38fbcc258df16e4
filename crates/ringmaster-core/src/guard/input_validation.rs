use async_trait::async_trait;

use super::traits::{GuardCategory, GuardCommand, GuardResult, GuardStage};
use crate::error::RuntimeError;

/// Rejects prompts whose trimmed length falls outside `[min_length,
/// max_length]` (in characters).
pub struct InputValidationStage {
    min_length: usize,
    max_length: usize,
}

impl InputValidationStage {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length,
        }
    }
}

#[async_trait]
impl GuardStage for InputValidationStage {
    fn name(&self) -> &str {
        "input_validation"
    }

    fn order(&self) -> i32 {
        20
    }

    async fn check(&self, command: &GuardCommand) -> Result<GuardResult, RuntimeError> {
        let length = command.text.trim().chars().count();

        let reason = if length < self.min_length {
            Some(format!(
                "Input too short: {length} characters (minimum {})",
                self.min_length
            ))
        } else if length > self.max_length {
            Some(format!(
                "Input too long: {length} characters (maximum {})",
                self.max_length
            ))
        } else {
            None
        };

        Ok(match reason {
            Some(reason) => GuardResult::Rejected {
                reason,
                category: GuardCategory::InvalidInput,
                stage: self.name().to_string(),
            },
            None => GuardResult::Allowed,
        })
    }
}
