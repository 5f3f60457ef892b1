//! Detection-result cache
//!
//! The cache is an optimization, not a system of record: read corruption
//! drops the entry and counts as a miss, and write failures never fail
//! the detection call.
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::models::DetectionResult;
use crate::store::KeyValueStore;

#[derive(Clone)]
pub struct DetectionCache {
    store: Arc<dyn KeyValueStore>,
}

impl DetectionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Get a cached detection result, or `None` on miss, corruption, or
    /// store failure.
    pub async fn get(&self, cache_key: &str) -> Option<DetectionResult> {
        let cached = match self.store.get(cache_key).await {
            Ok(value) => value,
            Err(e) => {
                error!(key = cache_key, error = %e, "Failed to retrieve cache entry");
                return None;
            }
        };

        let Some(cached) = cached else {
            debug!(key = cache_key, "Cache miss");
            return None;
        };

        match serde_json::from_str::<DetectionResult>(&cached) {
            Ok(result) => {
                info!(key = cache_key, "Cache hit");
                Some(result)
            }
            Err(e) => {
                error!(key = cache_key, error = %e, "Corrupt cache entry, deleting");
                self.delete(cache_key).await;
                None
            }
        }
    }

    /// Cache a detection result with the given TTL. Failures are logged
    /// and swallowed.
    pub async fn put(&self, cache_key: &str, result: &DetectionResult, ttl_seconds: u64) {
        let json = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                error!(key = cache_key, error = %e, "Failed to serialize detection result");
                return;
            }
        };

        match self.store.set_ex(cache_key, &json, ttl_seconds).await {
            Ok(()) => info!(key = cache_key, ttl_seconds, "Cached detection result"),
            Err(e) => error!(key = cache_key, error = %e, "Failed to cache detection result"),
        }
    }

    pub async fn exists(&self, cache_key: &str) -> bool {
        match self.store.exists(cache_key).await {
            Ok(exists) => exists,
            Err(e) => {
                error!(key = cache_key, error = %e, "Failed to check cache existence");
                false
            }
        }
    }

    pub async fn delete(&self, cache_key: &str) {
        match self.store.delete(cache_key).await {
            Ok(()) => info!(key = cache_key, "Deleted cache entry"),
            Err(e) => error!(key = cache_key, error = %e, "Failed to delete cache entry"),
        }
    }
}
