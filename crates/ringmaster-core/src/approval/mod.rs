//! Human-in-the-loop approval store.
//!
//! A tool call that requires approval parks on [`ApprovalStore::request_approval`]
//! until a human decides or the timeout fires:
//!
//! ```text
//! agent run ──▶ request_approval(…) ──▶ PendingApproval registered
//!                      │                         │
//!                 (suspended)            admin UI / chat action
//!                      │                         │
//!                      ◀── approve(id, args?) ───┘
//!                      ◀── reject(id, reason?)
//!                      ◀── timeout → {approved: false, "approval timed out"}
//! ```
//!
//! Each entry resolves exactly once (approve XOR reject XOR timeout); after
//! resolution it is gone from the live index.  Multiple waiters for the same
//! id are not supported.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

// ─── Public types ────────────────────────────────────────────────────────────

/// A tool call waiting for a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub run_id: String,
    pub user_id: Option<String>,
    pub tool_name: String,
    pub arguments: Value,
    pub requested_at: DateTime<Utc>,
    /// Channel the decision is expected from (informational).
    pub decision_channel: Option<String>,
}

/// The decision delivered back to the suspended tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// Replacement arguments supplied at approval time, if any.
    pub modified_arguments: Option<Value>,
    pub reason: Option<String>,
}

enum Decision {
    Approved(Option<Value>),
    Rejected(Option<String>),
}

struct PendingEntry {
    info: PendingApproval,
    waker: oneshot::Sender<Decision>,
}

// ─── ApprovalStore ───────────────────────────────────────────────────────────

/// Request/reply rendezvous between agent runs and human approvers.
pub struct ApprovalStore {
    pending: DashMap<String, PendingEntry>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Register a pending approval and suspend until it is decided or
    /// `timeout` elapses.
    pub async fn request_approval(
        &self,
        run_id: &str,
        user_id: Option<&str>,
        tool_name: &str,
        arguments: Value,
        decision_channel: Option<&str>,
        timeout: Duration,
    ) -> ApprovalResponse {
        let id = Uuid::new_v4().to_string();
        let (tx, mut rx) = oneshot::channel();

        let info = PendingApproval {
            id: id.clone(),
            run_id: run_id.to_string(),
            user_id: user_id.map(str::to_string),
            tool_name: tool_name.to_string(),
            arguments,
            requested_at: Utc::now(),
            decision_channel: decision_channel.map(str::to_string),
        };
        tracing::info!(approval_id = %id, tool = %tool_name, "approval requested");
        self.pending.insert(id.clone(), PendingEntry { info, waker: tx });

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(Decision::Approved(modified_arguments))) => ApprovalResponse {
                approved: true,
                modified_arguments,
                reason: None,
            },
            Ok(Ok(Decision::Rejected(reason))) => ApprovalResponse {
                approved: false,
                modified_arguments: None,
                reason: reason.or_else(|| Some("approval rejected".to_string())),
            },
            // The store itself dropped the sender; treat as rejection.
            Ok(Err(_)) => ApprovalResponse {
                approved: false,
                modified_arguments: None,
                reason: Some("approval channel closed".to_string()),
            },
            Err(_elapsed) => {
                // Remove the entry; if a decision raced in between the
                // timeout and the removal, honor it.
                if self.pending.remove(&id).is_none()
                    && let Ok(decision) = rx.await
                {
                    return match decision {
                        Decision::Approved(modified_arguments) => ApprovalResponse {
                            approved: true,
                            modified_arguments,
                            reason: None,
                        },
                        Decision::Rejected(reason) => ApprovalResponse {
                            approved: false,
                            modified_arguments: None,
                            reason: reason.or_else(|| Some("approval rejected".to_string())),
                        },
                    };
                }
                tracing::info!(approval_id = %id, tool = %tool_name, "approval timed out");
                ApprovalResponse {
                    approved: false,
                    modified_arguments: None,
                    reason: Some("approval timed out".to_string()),
                }
            }
        }
    }

    /// Approve a pending entry, optionally replacing the tool arguments.
    /// Returns `false` when the id is unknown or already completed.
    pub fn approve(&self, id: &str, modified_arguments: Option<Value>) -> bool {
        match self.pending.remove(id) {
            Some((_, entry)) => entry
                .waker
                .send(Decision::Approved(modified_arguments))
                .is_ok(),
            None => false,
        }
    }

    /// Reject a pending entry.  Returns `false` when the id is unknown or
    /// already completed.
    pub fn reject(&self, id: &str, reason: Option<String>) -> bool {
        match self.pending.remove(id) {
            Some((_, entry)) => entry.waker.send(Decision::Rejected(reason)).is_ok(),
            None => false,
        }
    }

    /// Snapshot of all pending entries.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        self.pending.iter().map(|e| e.value().info.clone()).collect()
    }

    /// Snapshot of pending entries for one user.
    pub fn list_pending_by_user(&self, user_id: &str) -> Vec<PendingApproval> {
        self.pending
            .iter()
            .filter(|e| e.value().info.user_id.as_deref() == Some(user_id))
            .map(|e| e.value().info.clone())
            .collect()
    }
}

impl Default for ApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}
