use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::conversation::{ConversationMemory, TokenEstimator, default_token_estimator};

/// Session-id → [`ConversationMemory`] map with LRU session eviction.
///
/// `get_or_create` is atomic: concurrent callers for the same session all
/// receive the same instance.  Every access (read or create) refreshes the
/// session's recency; when the session count exceeds `max_sessions` the
/// least-recently-used session is dropped, so exactly `max_sessions`
/// sessions survive an overflow.
pub struct MemoryStore {
    max_messages: usize,
    estimator: TokenEstimator,
    sessions: Mutex<LruCache<String, Arc<ConversationMemory>>>,
}

impl MemoryStore {
    pub fn new(max_sessions: usize, max_messages: usize) -> Self {
        Self::with_estimator(max_sessions, max_messages, Arc::new(default_token_estimator))
    }

    pub fn with_estimator(
        max_sessions: usize,
        max_messages: usize,
        estimator: TokenEstimator,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_sessions.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            max_messages,
            estimator,
            sessions: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch the session's memory, creating it if absent.
    pub fn get_or_create(&self, session_id: &str) -> Arc<ConversationMemory> {
        let mut sessions = self.sessions.lock();
        sessions
            .get_or_insert(session_id.to_string(), || {
                Arc::new(ConversationMemory::with_estimator(
                    self.max_messages,
                    self.estimator.clone(),
                ))
            })
            .clone()
    }

    /// Fetch without creating.  Still counts as an access for LRU purposes.
    pub fn get(&self, session_id: &str) -> Option<Arc<ConversationMemory>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Drop a session.  Returns `true` when it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().pop(session_id).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
