//! Streaming execution: the same ReAct pipeline, emitted as a lazy, finite
//! sequence of strings.
//!
//! Text chunks from every model iteration are forwarded in iteration order.
//! Tool execution is bracketed with `[tool_start:<name>]` /
//! `[tool_end:<name>]` markers — parsable by observers, ignorable by
//! displayers.  A failed run emits a final `[error] <message>` sentinel and
//! then completes.  The concatenation of the emitted text chunks equals the
//! content persisted to memory and passed to after-complete hooks.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::command::AgentCommand;
use super::executor::AgentExecutor;
use super::CancellationSignal;
use crate::error::RuntimeError;
use crate::llm::{ChatClient, ChatRequest, ChatResponse, assemble_tool_calls};

/// The output sequence of a streaming run.
pub type AgentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

impl AgentExecutor {
    /// Execute a command, streaming output incrementally.
    pub fn execute_stream(self: &Arc<Self>, cmd: AgentCommand) -> AgentStream {
        self.execute_stream_with_cancel(cmd, CancellationSignal::new())
    }

    /// Streaming execution with an externally controlled cancellation signal.
    pub fn execute_stream_with_cancel(
        self: &Arc<Self>,
        cmd: AgentCommand,
        cancel: CancellationSignal,
    ) -> AgentStream {
        let (tx, rx) = mpsc::channel::<String>(64);
        let executor = Arc::clone(self);

        tokio::spawn(async move {
            match executor.run(cmd, cancel, Some(tx.clone())).await {
                Ok(result) if !result.success => {
                    let message = result
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string());
                    let _ = tx.send(format!("[error] {message}")).await;
                }
                Ok(_) => {}
                Err(RuntimeError::Cancelled) => {
                    let _ = tx.send("[error] cancelled".to_string()).await;
                }
                Err(RuntimeError::Other(raw)) => {
                    let _ = tx.send(format!("[error] {raw}")).await;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Drive one streamed model iteration: forward text deltas to `sink`,
/// accumulate tool-call deltas, and fold everything into a complete
/// [`ChatResponse`] for the loop to act on.
pub(super) async fn stream_one_iteration(
    chat: &dyn ChatClient,
    request: ChatRequest,
    sink: &mpsc::Sender<String>,
) -> Result<ChatResponse, String> {
    let mut stream = chat.chat_stream(request).await?;

    let mut content = String::new();
    let mut deltas = Vec::new();
    let mut usage = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.delta.is_empty() {
            content.push_str(&chunk.delta);
            let _ = sink.send(chunk.delta).await;
        }
        deltas.extend(chunk.tool_call_deltas);
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
    }

    Ok(ChatResponse {
        content,
        tool_calls: assemble_tool_calls(&deltas),
        usage,
    })
}
