//! In-memory response cache for the read endpoints.
//!
//! Handlers store serialized JSON under keys like `matches:all`. Writers
//! (sync, prediction passes, commentary) drop whole key families by prefix so
//! readers never see a table or fixture list older than the last write.
//!
//! Every invalidation bumps a generation counter. A reader notes the
//! generation before building a response and the store is refused if an
//! invalidation happened in between, so a value built from pre-write data
//! cannot land after the write dropped its key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

/// Thread-safe, TTL-bounded cache of JSON responses.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheInner>>,
    ttl: Duration,
    enabled: bool,
}

struct CacheInner {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
    generation: u64,
}

struct Entry {
    value: Value,
    inserted_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub keys: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: u64,
}

/// `prefix:part1:part2…`
pub fn cache_key(prefix: &str, parts: &[&str]) -> String {
    std::iter::once(prefix)
        .chain(parts.iter().copied())
        .collect::<Vec<_>>()
        .join(":")
}

impl ResponseCache {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        ResponseCache {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                generation: 0,
            })),
            ttl,
            enabled,
        }
    }

    /// Fresh value for `key`, if any. Expired entries are evicted on read.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }
        let mut inner = self.inner.write().await;
        let fresh = inner
            .entries
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.value.clone());
        match fresh {
            Some(value) => {
                inner.hits += 1;
                debug!("Cache hit for {}", key);
                Some(value)
            }
            None => {
                inner.entries.remove(key);
                inner.misses += 1;
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    /// Current invalidation generation. Read it before building a value to
    /// pass to [`ResponseCache::set`].
    pub async fn generation(&self) -> u64 {
        self.inner.read().await.generation
    }

    /// Store `value` unless an invalidation ran since `seen_generation` was
    /// read. Returns whether it was stored.
    pub async fn set(&self, key: &str, value: Value, seen_generation: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let mut inner = self.inner.write().await;
        if inner.generation != seen_generation {
            debug!("Not caching {}: invalidated while it was built", key);
            return false;
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Drop every key in the `prefix` family. Returns how many were removed.
    pub async fn invalidate(&self, prefix: &str) -> usize {
        let family = format!("{}:", prefix);
        let mut inner = self.inner.write().await;
        inner.generation += 1;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|k, _| k != prefix && !k.starts_with(&family));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!("Invalidated {} '{}' cache entries", removed, prefix);
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.read().await;
        CacheStats {
            enabled: self.enabled,
            keys: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
