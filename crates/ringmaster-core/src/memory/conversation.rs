use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::llm::ChatRole;

// ─── MemoryMessage ───────────────────────────────────────────────────────────

/// One message in a session's history.  Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MemoryMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ─── Token estimation ────────────────────────────────────────────────────────

/// Estimates the token count of a message body.
pub type TokenEstimator = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Default estimator: `max(1, ceil(ascii/4 + cjk/1.5))`; empty string → 0.
///
/// CJK ideographs, kana, and hangul tokenize far denser than ASCII, hence
/// the separate divisor.
pub fn default_token_estimator(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut ascii = 0usize;
    let mut cjk = 0usize;
    for c in text.chars() {
        if is_cjk(c) {
            cjk += 1;
        } else {
            ascii += 1;
        }
    }
    let estimate = (ascii as f64 / 4.0 + cjk as f64 / 1.5).ceil() as usize;
    estimate.max(1)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF       // hiragana + katakana
        | 0x3400..=0x4DBF     // CJK extension A
        | 0x4E00..=0x9FFF     // CJK unified ideographs
        | 0xAC00..=0xD7AF     // hangul syllables
        | 0xF900..=0xFAFF     // CJK compatibility ideographs
    )
}

// ─── ConversationMemory ──────────────────────────────────────────────────────

/// Bounded per-session message ring.
///
/// Appends preserve order; overflow evicts from the front so the retained
/// window is always the contiguous most-recent suffix.  All operations are
/// safe under concurrent use; reads return point-in-time snapshots and do
/// not block writers beyond the copy.
pub struct ConversationMemory {
    max_messages: usize,
    estimator: TokenEstimator,
    messages: Mutex<VecDeque<MemoryMessage>>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize) -> Self {
        Self::with_estimator(max_messages, Arc::new(default_token_estimator))
    }

    pub fn with_estimator(max_messages: usize, estimator: TokenEstimator) -> Self {
        Self {
            max_messages,
            estimator,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a message, evicting from the front past `max_messages`.
    pub fn add(&self, message: MemoryMessage) {
        let mut messages = self.messages.lock();
        messages.push_back(message);
        while messages.len() > self.max_messages {
            messages.pop_front();
        }
    }

    /// Full ordered snapshot of the history.
    pub fn history(&self) -> Vec<MemoryMessage> {
        self.messages.lock().iter().cloned().collect()
    }

    /// The longest most-recent suffix whose summed token estimate fits in
    /// `max_tokens`, in original order.  Empty when even the newest message
    /// alone exceeds the budget.
    pub fn history_within_token_limit(&self, max_tokens: usize) -> Vec<MemoryMessage> {
        let messages = self.messages.lock();
        let mut budget = max_tokens as i64;
        let mut suffix: Vec<MemoryMessage> = Vec::new();

        for message in messages.iter().rev() {
            budget -= (self.estimator)(&message.content) as i64;
            if budget < 0 {
                break;
            }
            suffix.push(message.clone());
        }

        suffix.reverse();
        suffix
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> MemoryMessage {
        MemoryMessage::new(ChatRole::User, content)
    }

    #[test]
    fn add_preserves_order() {
        let memory = ConversationMemory::new(10);
        memory.add(msg("one"));
        memory.add(msg("two"));
        memory.add(msg("three"));

        let contents: Vec<String> = memory.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let memory = ConversationMemory::new(3);
        for i in 0..5 {
            memory.add(msg(&format!("m{i}")));
        }
        let contents: Vec<String> = memory.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"], "retained window is the recent suffix");
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn concurrent_adds_respect_the_cap() {
        let memory = Arc::new(ConversationMemory::new(20));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let memory = memory.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        memory.add(MemoryMessage::new(ChatRole::User, format!("{i}:{j}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread");
        }
        assert_eq!(memory.len(), 20);
    }

    #[test]
    fn token_limit_takes_recent_suffix() {
        // Estimator: 1 token per char makes the math readable.
        let memory =
            ConversationMemory::with_estimator(10, Arc::new(|s: &str| s.chars().count()));
        memory.add(msg("aaaaa")); // 5 tokens
        memory.add(msg("bbb")); // 3 tokens
        memory.add(msg("cc")); // 2 tokens

        let within = memory.history_within_token_limit(5);
        let contents: Vec<String> = within.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["bbb", "cc"]);
    }

    #[test]
    fn token_limit_empty_when_last_message_is_too_big() {
        let memory =
            ConversationMemory::with_estimator(10, Arc::new(|s: &str| s.chars().count()));
        memory.add(msg("short"));
        memory.add(msg("this one is far too long for the budget"));
        assert!(memory.history_within_token_limit(4).is_empty());
    }

    #[test]
    fn token_limit_exact_fit_is_included() {
        let memory =
            ConversationMemory::with_estimator(10, Arc::new(|s: &str| s.chars().count()));
        memory.add(msg("abcd"));
        let within = memory.history_within_token_limit(4);
        assert_eq!(within.len(), 1);
    }

    #[test]
    fn default_estimator_follows_the_formula() {
        assert_eq!(default_token_estimator(""), 0);
        assert_eq!(default_token_estimator("a"), 1, "minimum is 1 for non-empty");
        // 8 ASCII chars → ceil(8/4) = 2.
        assert_eq!(default_token_estimator("abcdefgh"), 2);
        // 3 hangul syllables → ceil(3/1.5) = 2.
        assert_eq!(default_token_estimator("안녕하"), 2);
        // Mixed: 4 ASCII + 3 CJK → ceil(1 + 2) = 3.
        assert_eq!(default_token_estimator("abcd안녕하"), 3);
    }
}
