//! Conversation memory: per-session bounded history with LRU session
//! eviction, plus an optional SQLite-backed persistent store.

mod conversation;
mod sqlite_store;
mod store;

pub use conversation::{
    ConversationMemory, MemoryMessage, TokenEstimator, default_token_estimator,
};
pub use sqlite_store::SqliteConversationStore;
pub use store::MemoryStore;
