//! Backing stores for cached verdicts.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::verdict::Verdict;

/// A verdict stored under a token fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub verdict: Verdict,
    /// `None` when the TTL reaches past what `Instant` can represent.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Failure reported by a backing store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// Key/value storage for cache entries.
///
/// Stores are not expected to honour `expires_at` themselves; the cache
/// checks liveness on read.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Number of stored entries, live or not.
    async fn size(&self) -> Result<usize, CacheError>;

    /// Drop entries that expired at or before `now`; returns how many went.
    async fn purge_expired(&self, now: Instant) -> Result<usize, CacheError>;
}

/// In-process store over a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.inner.remove(key);
        Ok(())
    }

    async fn size(&self) -> Result<usize, CacheError> {
        Ok(self.inner.len())
    }

    async fn purge_expired(&self, now: Instant) -> Result<usize, CacheError> {
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.inner.len()))
    }
}
