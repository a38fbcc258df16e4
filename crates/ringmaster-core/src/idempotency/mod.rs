//! Write idempotency service.
//!
//! Deduplicates side-effecting tool executions within a TTL window.  The key
//! is either caller-supplied or derived from a content hash of the call's
//! identifying parts.  Concurrent calls for the same key collapse to a
//! single execution: one caller runs the closure, the rest await and share
//! its result.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::config::IdempotencyConfig;

#[derive(Clone)]
struct CacheSlot {
    inserted_at: Instant,
    cell: Arc<OnceCell<String>>,
}

/// TTL + LRU cache of write-tool results keyed by
/// `tool_name:(explicit key | content hash)`.
pub struct WriteIdempotencyService {
    enabled: bool,
    ttl: Duration,
    cache: Mutex<LruCache<String, CacheSlot>>,
}

impl WriteIdempotencyService {
    pub fn new(config: &IdempotencyConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Compose the cache key for a call.
    pub fn compose_key(
        tool_name: &str,
        explicit_key: Option<&str>,
        key_parts: &[String],
    ) -> String {
        match explicit_key {
            Some(key) => format!("{tool_name}:{key}"),
            None => {
                let mut hasher = Sha256::new();
                for (i, part) in key_parts.iter().enumerate() {
                    if i > 0 {
                        hasher.update([0u8]);
                    }
                    hasher.update(part.as_bytes());
                }
                format!("{tool_name}:{}", hex::encode(hasher.finalize()))
            }
        }
    }

    /// Execute `f` at most once per key per TTL window.
    ///
    /// A cached, unexpired value is returned without calling `f`.  Failures
    /// are never cached: a later call with the same key retries.  When the
    /// service is disabled, `f` always runs.
    pub async fn execute<F, Fut>(
        &self,
        tool_name: &str,
        explicit_key: Option<&str>,
        key_parts: &[String],
        f: F,
    ) -> Result<String, String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        if !self.enabled {
            return f().await;
        }

        let key = Self::compose_key(tool_name, explicit_key, key_parts);
        let cell = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(slot) if slot.inserted_at.elapsed() < self.ttl => slot.cell.clone(),
                _ => {
                    let slot = CacheSlot {
                        inserted_at: Instant::now(),
                        cell: Arc::new(OnceCell::new()),
                    };
                    cache.put(key.clone(), slot.clone());
                    slot.cell
                }
            }
        };

        if let Some(cached) = cell.get() {
            tracing::debug!(key = %key, "idempotency cache hit");
            return Ok(cached.clone());
        }

        cell.get_or_try_init(f).await.cloned()
    }

    /// Number of live cache entries (expired entries linger until evicted).
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
