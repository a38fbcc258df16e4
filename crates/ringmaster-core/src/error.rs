//! Shared error type for fallible extension points.
//!
//! Guard stages and hooks report failures as [`RuntimeError`].  Cooperative
//! cancellation is a dedicated variant so that dispatch code can re-raise it
//! unconditionally — a hook's `fail_on_error` setting applies to
//! [`RuntimeError::Other`] only, never to [`RuntimeError::Cancelled`].

use thiserror::Error;

/// Error raised by guard stages, hooks, and the executor internals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The run was cancelled cooperatively.  Always propagated as-is.
    #[error("cancelled")]
    Cancelled,

    /// Any other failure, carrying the raw message.
    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::Other`].
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// `true` for [`RuntimeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<String> for RuntimeError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for RuntimeError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
