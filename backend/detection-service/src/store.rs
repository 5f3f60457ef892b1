//! Shared key/value store seam for the cache and budget counters
//!
//! The cache store and budget tracker are the only shared mutable state in
//! the pipeline. Both run over this narrow interface so production uses
//! Redis while Redis-less deployments and tests use the in-process store.
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis_utils::SharedConnectionManager;
use std::time::{Duration, Instant};

/// Minimal key/value contract: string values, TTLs, atomic counters.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;
    /// Atomically add `amount` to an integer counter, returning the
    /// post-increment value.
    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

// ============================================
// Redis-backed store
// ============================================

/// Store backed by the shared Redis connection manager.
#[derive(Clone)]
pub struct RedisStore {
    manager: SharedConnectionManager,
}

impl RedisStore {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }

    async fn connection(&self) -> redis::aio::ConnectionManager {
        redis_utils::connection(&self.manager).await
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await;
        conn.get(key).await.context("GET failed")
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await;
        conn.set_ex(key, value, ttl_seconds)
            .await
            .context("SETEX failed")
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.connection().await;
        conn.incr(key, amount).await.context("INCRBY failed")
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.connection().await;
        conn.expire(key, ttl_seconds as i64)
            .await
            .context("EXPIRE failed")
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await;
        conn.del(key).await.context("DEL failed")
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await;
        conn.exists(key).await.context("EXISTS failed")
    }
}

// ============================================
// In-process store
// ============================================

struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process store over a concurrent map, with lazy expiry.
///
/// Used when REDIS_URL is not configured, and by tests. Per-key atomicity
/// comes from the map's entry locking.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Drop expired entries on read rather than sweeping.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut entry = self.entries.entry(key.to_string()).or_insert(StoredEntry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired() {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: i64 = entry.value.parse().unwrap_or(0);
        let next = current + amount;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
