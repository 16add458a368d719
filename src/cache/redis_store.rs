//! Redis-backed verdict store.
//!
//! Lets several authorizer instances share one verdict cache. Verdicts are
//! stored as JSON under `verdict:<fingerprint>` and expire through Redis's
//! own key TTLs, so `purge_expired` has nothing to do.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

use crate::cache::store::{CacheEntry, CacheError, CacheStore};
use crate::clock::SharedClock;
use crate::verdict::Verdict;

const KEY_PREFIX: &str = "verdict:";

/// Upper bound for connecting to Redis.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound for a single command round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_millis(250);

/// Longest expiry handed to Redis (100 years).
const MAX_EXPIRY_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Verdict store on a Redis server.
///
/// The connection is opened on first use and re-established by the
/// connection manager after failures. Every call is bounded by a timeout so
/// an unreachable server surfaces as a `CacheError` rather than a stall.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    clock: SharedClock,
}

impl RedisStore {
    /// Parse `url` and prepare a store. No connection is made yet.
    pub fn new(url: &str, clock: SharedClock) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            clock,
        })
    }

    /// Round-trip a PING.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = bounded(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("Connecting to redis");
                match timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone())).await {
                    Ok(result) => result.map_err(CacheError::from),
                    Err(_) => Err(CacheError::Backend("connect timed out".to_string())),
                }
            })
            .await?;
        Ok(conn.clone())
    }
}

fn redis_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

async fn bounded<T>(
    fut: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T, CacheError> {
    match timeout(COMMAND_TIMEOUT, fut).await {
        Ok(result) => result.map_err(CacheError::from),
        Err(_) => Err(CacheError::Backend("command timed out".to_string())),
    }
}

/// Milliseconds until `expires_at`, clamped to what Redis accepts.
fn expiry_ms(expires_at: Instant, now: Instant) -> u64 {
    let ms = expires_at.saturating_duration_since(now).as_millis();
    u64::try_from(ms).unwrap_or(MAX_EXPIRY_MS).clamp(1, MAX_EXPIRY_MS)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.connection().await?;
        let key = redis_key(key);
        let (value, pttl): (Option<String>, i64) = bounded(
            redis::pipe()
                .cmd("GET")
                .arg(&key)
                .cmd("PTTL")
                .arg(&key)
                .query_async(&mut conn),
        )
        .await?;

        let Some(value) = value else {
            return Ok(None);
        };
        let verdict: Verdict = serde_json::from_str(&value)
            .map_err(|e| CacheError::Backend(format!("undecodable entry: {}", e)))?;

        // -2: key vanished between the two commands; -1: no expiry set.
        let expires_at = match pttl {
            -2 => return Ok(None),
            ms if ms >= 0 => self.clock.now().checked_add(Duration::from_millis(ms as u64)),
            _ => None,
        };
        Ok(Some(CacheEntry { verdict, expires_at }))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let value = serde_json::to_string(&entry.verdict)
            .map_err(|e| CacheError::Backend(format!("unencodable entry: {}", e)))?;
        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(redis_key(key)).arg(value);
        if let Some(expires_at) = entry.expires_at {
            cmd.arg("PX").arg(expiry_ms(expires_at, self.clock.now()));
        }
        let _: () = bounded(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = bounded(redis::cmd("DEL").arg(redis_key(key)).query_async(&mut conn)).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        bounded(redis::cmd("DBSIZE").query_async(&mut conn)).await
    }

    async fn purge_expired(&self, _now: Instant) -> Result<usize, CacheError> {
        Ok(0)
    }
}
