//! The agent executor: one [`AgentCommand`] in, one bounded ReAct run out.

mod command;
mod error_resolver;
mod executor;
mod streaming;

pub use command::{AgentCommand, AgentMode, AgentResult, ErrorCode};
pub use error_resolver::{DefaultErrorMessageResolver, ErrorMessageResolver, classify_error};
pub use executor::AgentExecutor;
pub use streaming::AgentStream;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a run and its caller.
///
/// The executor checks the flag at loop boundaries (before each model call
/// and each tool call) and aborts with
/// [`RuntimeError::Cancelled`](crate::error::RuntimeError::Cancelled).
#[derive(Clone, Default)]
pub struct CancellationSignal(Arc<AtomicBool>);

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
