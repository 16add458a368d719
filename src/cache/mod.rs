//! Verdict cache subsystem.
//!
//! # Data Flow
//! ```text
//! token
//!     → fingerprint (SHA-256, hex)
//!     → VerdictCache::get (liveness check against the clock, hit/miss counters)
//!     → store.rs (CacheStore trait; MemoryStore by default)
//!     → redis_store.rs (RedisStore, shared across instances)
//!
//! Verdict from the API
//!     → VerdictCache::store_verdict (positive or negative TTL)
//!     → store.rs
//! ```
//!
//! # Design Decisions
//! - Keys are token hashes; raw tokens never reach the store
//! - Store errors degrade to a miss (reads) or a warning (writes)
//! - Rejected verdicts live longer than accepted ones to absorb abusive retries
//! - Hit/miss counters are monotonic for the process lifetime

pub mod redis_store;
pub mod store;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tokio::time;

use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::verdict::Verdict;

pub use redis_store::RedisStore;
pub use store::{CacheEntry, CacheError, CacheStore, MemoryStore};

/// Derive the cache key for a token.
pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// Fail-soft verdict cache with asymmetric TTLs.
pub struct VerdictCache {
    store: Arc<dyn CacheStore>,
    clock: SharedClock,
    positive_ttl: Duration,
    negative_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Entry count last reported by the store.
    size: AtomicUsize,
}

impl VerdictCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: SharedClock, config: &CacheConfig) -> Self {
        Self {
            store,
            clock,
            positive_ttl: config.positive_ttl(),
            negative_ttl: config.negative_ttl(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            size: AtomicUsize::new(0),
        }
    }

    /// Look up a live verdict. Store failures count as misses.
    pub async fn get(&self, fingerprint: &str) -> Option<Verdict> {
        let now = self.clock.now();
        let found = match self.store.get(fingerprint).await {
            Ok(Some(entry)) if entry.is_live(now) => Some(entry.verdict),
            Ok(Some(_)) => {
                match self.store.remove(fingerprint).await {
                    Ok(()) => self.refresh_size().await,
                    Err(e) => tracing::debug!(error = %e, "Failed to drop expired cache entry"),
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_error("get");
                None
            }
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(found.is_some());
        found
    }

    /// Store a verdict for `ttl`. Failures are logged and swallowed.
    pub async fn set(&self, fingerprint: &str, verdict: Verdict, ttl: Duration) {
        let entry = CacheEntry {
            verdict,
            expires_at: self.clock.now().checked_add(ttl),
        };
        match self.store.set(fingerprint, entry).await {
            Ok(()) => self.refresh_size().await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to cache verdict");
                metrics::record_cache_error("set");
            }
        }
    }

    /// Store a verdict with the TTL its outcome calls for.
    pub async fn store_verdict(&self, fingerprint: &str, verdict: Verdict) {
        let ttl = self.ttl_for(&verdict);
        self.set(fingerprint, verdict, ttl).await;
    }

    pub fn ttl_for(&self, verdict: &Verdict) -> Duration {
        if verdict.is_valid_token() {
            self.positive_ttl
        } else {
            self.negative_ttl
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries from the store.
    pub async fn purge_expired(&self) -> usize {
        let purged = match self.store.purge_expired(self.clock.now()).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::warn!(error = %e, "Cache purge failed");
                metrics::record_cache_error("purge");
                0
            }
        };
        self.refresh_size().await;
        purged
    }

    async fn refresh_size(&self) {
        match self.store.size().await {
            Ok(size) => {
                self.size.store(size, Ordering::Relaxed);
                metrics::record_cache_size(size);
            }
            Err(e) => tracing::debug!(error = %e, "Failed to read cache size"),
        }
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Cache sweeper starting");
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
