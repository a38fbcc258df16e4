//! Guard pipeline: the pre-model admission gate.
//!
//! Every agent run passes through an ordered list of [`GuardStage`]s before
//! any model call.  The first stage that rejects ends evaluation; a run
//! rejected here never reaches the hooks or the LLM.

mod injection;
mod input_validation;
mod pipeline;
mod rate_limit;
mod traits;

pub use injection::InjectionDetectionStage;
pub use input_validation::InputValidationStage;
pub use pipeline::GuardPipeline;
pub use rate_limit::RateLimitStage;
pub use traits::{GuardCategory, GuardCommand, GuardResult, GuardStage};
