//! Retrieval-augmented-generation seam.
//!
//! When a [`RagPipeline`] is wired and retrieval is enabled, the executor
//! appends the retrieved context to the system prompt under a
//! `[Retrieved Context]` section before the first model call.  Retrieval
//! failures are logged and the run continues without context.

use async_trait::async_trait;

/// A retrieval request.
#[derive(Debug, Clone)]
pub struct RagQuery {
    pub query: String,
    pub top_k: usize,
    pub rerank: bool,
}

/// The retrieved context for one query.
#[derive(Debug, Clone)]
pub struct RagResult {
    /// Concatenated context text, ready for prompt injection.
    pub context: String,
    /// Whether any documents matched the query.
    pub has_documents: bool,
}

/// Abstraction over a retrieval pipeline (vector store, keyword index, …).
#[async_trait]
pub trait RagPipeline: Send + Sync {
    async fn retrieve(&self, query: RagQuery) -> Result<RagResult, String>;
}

/// Append a `[Retrieved Context]` section to `system_prompt`.
pub(crate) fn inject_context(system_prompt: &str, context: &str) -> String {
    if system_prompt.is_empty() {
        format!("[Retrieved Context]\n{context}")
    } else {
        format!("{system_prompt}\n\n[Retrieved Context]\n{context}")
    }
}
