//! Short-TTL key/value cache capability.
//!
//! The cache holds only *negative* knowledge and short-lived snapshots:
//! revoked token jtis, known-invalid session markers, and validation
//! snapshots of a few minutes at most. Valid sessions and valid tokens are
//! never written here, since a stale positive entry would defeat revocation.
//!
//! Every failure is non-fatal: a broken cache behaves like an empty one and
//! the consumer falls back to the authoritative store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn exists(&self, key: &str) -> bool;
    fn available(&self) -> bool;
}

/// Redis-backed cache.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!("cache get failed for {key}: {e}");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        if let Err(e) = conn.set_ex::<_, _, ()>(key, value, ttl_secs).await {
            warn!("cache set failed for {key}: {e}");
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.conn.clone();
        match conn.exists::<_, bool>(key).await {
            Ok(found) => found,
            Err(e) => {
                debug!("cache exists failed for {key}: {e}");
                false
            }
        }
    }

    fn available(&self) -> bool {
        true
    }
}

/// Cache that stores nothing. Used when no cache is configured.
pub struct NoopCache;

#[async_trait]
impl Cache for NoopCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}

    async fn exists(&self, _key: &str) -> bool {
        false
    }

    fn available(&self) -> bool {
        false
    }
}

/// In-process cache with per-entry expiry.
///
/// Suitable for single-instance deployments and tests; multi-instance
/// deployments want [`RedisCache`] so revocations propagate.
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let (value, expires_at) = entries.get(key)?;
        if *expires_at <= Instant::now() {
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        // Drop expired entries opportunistically so the map stays bounded.
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    fn available(&self) -> bool {
        true
    }
}
