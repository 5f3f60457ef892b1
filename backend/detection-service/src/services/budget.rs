//! Vision usage budget tracker
//!
//! Hour/day counters over the shared store plus a derived cost estimate,
//! so operators can monitor spend. Limits are observational: the tracker
//! warns when usage approaches a configured limit but never denies work.
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::BudgetStats;
use crate::store::KeyValueStore;

const HOUR_TTL_SECONDS: u64 = 3600;
const DAY_TTL_SECONDS: u64 = 86_400;

#[derive(Clone)]
pub struct BudgetTracker {
    store: Arc<dyn KeyValueStore>,
    max_requests_per_hour: i64,
    max_requests_per_day: i64,
    max_cost_per_day: f64,
    cost_per_image: f64,
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        Self {
            store,
            max_requests_per_hour: config.max_requests_per_hour,
            max_requests_per_day: config.max_requests_per_day,
            max_cost_per_day: config.max_cost_per_day,
            cost_per_image: config.cost_per_image,
        }
    }

    /// Record a batch of analyzed images against the current hour and day
    /// buckets.
    pub async fn record_usage(&self, image_count: u32) {
        if image_count == 0 {
            return;
        }

        let now = Utc::now();
        let amount = i64::from(image_count);

        let hourly_count = self
            .increment(&hourly_key(&now), amount, HOUR_TTL_SECONDS)
            .await;
        let daily_count = self
            .increment(&daily_key(&now), amount, DAY_TTL_SECONDS)
            .await;

        let hourly_cost = hourly_count as f64 * self.cost_per_image;
        let daily_cost = daily_count as f64 * self.cost_per_image;

        info!(
            hourly_count,
            hourly_cost,
            daily_count,
            daily_cost,
            "Vision usage recorded"
        );

        if daily_cost >= self.max_cost_per_day * 0.8 {
            warn!(
                daily_cost,
                limit = self.max_cost_per_day,
                "Daily vision cost approaching limit"
            );
        }

        if daily_count as f64 >= self.max_requests_per_day as f64 * 0.8 {
            warn!(
                daily_count,
                limit = self.max_requests_per_day,
                "Daily vision request volume approaching limit"
            );
        }

        if hourly_count as f64 >= self.max_requests_per_hour as f64 * 0.8 {
            warn!(
                hourly_count,
                limit = self.max_requests_per_hour,
                "Hourly vision request volume approaching limit"
            );
        }
    }

    /// Current usage snapshot for dashboards and health checks.
    pub async fn stats(&self) -> BudgetStats {
        let now = Utc::now();
        let hourly_requests = self.count(&hourly_key(&now)).await;
        let daily_requests = self.count(&daily_key(&now)).await;

        BudgetStats {
            hourly_requests,
            daily_requests,
            hourly_cost: hourly_requests as f64 * self.cost_per_image,
            daily_cost: daily_requests as f64 * self.cost_per_image,
            hourly_limit: self.max_requests_per_hour,
            daily_limit: self.max_requests_per_day,
            daily_cost_limit: self.max_cost_per_day,
        }
    }

    pub async fn reset_hourly(&self) {
        if let Err(e) = self.store.delete(&hourly_key(&Utc::now())).await {
            error!(error = %e, "Failed to reset hourly usage counter");
            return;
        }
        info!("Reset hourly vision usage counter");
    }

    pub async fn reset_daily(&self) {
        if let Err(e) = self.store.delete(&daily_key(&Utc::now())).await {
            error!(error = %e, "Failed to reset daily usage counter");
            return;
        }
        info!("Reset daily vision usage counter");
    }

    // ----------------------------------------------------------------------
    // Internal helpers
    // ----------------------------------------------------------------------

    /// Atomically add to a bucket counter. The bucket's expiry is set only
    /// on its first write (post-increment value equals the amount), which
    /// makes buckets self-expiring without a sweep process. A non-first
    /// writer can create the bucket under extreme concurrency; that narrow
    /// race is an accepted trade-off.
    async fn increment(&self, key: &str, amount: i64, ttl_seconds: u64) -> i64 {
        match self.store.incr_by(key, amount).await {
            Ok(value) => {
                if value == amount {
                    if let Err(e) = self.store.expire(key, ttl_seconds).await {
                        error!(key, error = %e, "Failed to set counter expiry");
                    }
                }
                value
            }
            Err(e) => {
                error!(key, amount, error = %e, "Failed to increment usage counter");
                0
            }
        }
    }

    async fn count(&self, key: &str) -> i64 {
        match self.store.get(key).await {
            Ok(Some(value)) => value.parse().unwrap_or_else(|_| {
                error!(key, %value, "Failed to parse usage counter");
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                error!(key, error = %e, "Failed to read usage counter");
                0
            }
        }
    }
}

fn hourly_key(now: &DateTime<Utc>) -> String {
    format!("ai:usage:hour:{}:{}", now.format("%Y-%m-%d"), now.hour())
}

fn daily_key(now: &DateTime<Utc>) -> String {
    format!("ai:usage:day:{}", now.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker_config() -> Config {
        Config {
            openai_api_key: String::new(),
            openai_api_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-5-mini".to_string(),
            openai_timeout_ms: 30_000,
            use_detailed_prompt: true,
            confidence_threshold: 0.85,
            cache_ttl_seconds: 3600,
            redis_url: String::new(),
            max_requests_per_hour: 300,
            max_requests_per_day: 3000,
            max_cost_per_day: 150.0,
            cost_per_image: 0.01,
            taxonomy_path: None,
        }
    }

    #[test]
    fn test_bucket_keys() {
        let at = Utc.with_ymd_and_hms(2025, 11, 9, 14, 30, 0).unwrap();
        assert_eq!(hourly_key(&at), "ai:usage:hour:2025-11-09:14");
        assert_eq!(daily_key(&at), "ai:usage:day:2025-11-09");
    }

    #[tokio::test]
    async fn test_record_usage_accumulates() {
        let store = Arc::new(MemoryStore::new());
        let tracker = BudgetTracker::new(store, &tracker_config());

        tracker.record_usage(2).await;
        tracker.record_usage(3).await;

        let stats = tracker.stats().await;
        assert_eq!(stats.hourly_requests, 5);
        assert_eq!(stats.daily_requests, 5);
        assert!((stats.daily_cost - 0.05).abs() < 1e-9);
        assert_eq!(stats.remaining_hourly_requests(), 295);
    }

    #[tokio::test]
    async fn test_record_usage_zero_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let tracker = BudgetTracker::new(store.clone(), &tracker_config());

        tracker.record_usage(0).await;

        let stats = tracker.stats().await;
        assert_eq!(stats.hourly_requests, 0);
        assert_eq!(stats.daily_requests, 0);
        assert!(!store.exists(&daily_key(&Utc::now())).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_counters() {
        let tracker = BudgetTracker::new(Arc::new(MemoryStore::new()), &tracker_config());
        tracker.record_usage(4).await;

        tracker.reset_hourly().await;
        let stats = tracker.stats().await;
        assert_eq!(stats.hourly_requests, 0);
        assert_eq!(stats.daily_requests, 4);

        tracker.reset_daily().await;
        assert_eq!(tracker.stats().await.daily_requests, 0);
    }

    /// Delegates to a MemoryStore while counting expire calls.
    struct ExpireCountingStore {
        inner: MemoryStore,
        expire_calls: AtomicUsize,
    }

    impl ExpireCountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                expire_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for ExpireCountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
            self.inner.set_ex(key, value, ttl_seconds).await
        }
        async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
            self.inner.incr_by(key, amount).await
        }
        async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
            self.expire_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.expire(key, ttl_seconds).await
        }
        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
    }

    #[tokio::test]
    async fn test_expiry_set_only_on_first_write() {
        let store = Arc::new(ExpireCountingStore::new());
        let tracker = BudgetTracker::new(store.clone(), &tracker_config());

        tracker.record_usage(2).await;
        // First write touches two buckets (hour + day), one expire each.
        assert_eq!(store.expire_calls.load(Ordering::SeqCst), 2);

        tracker.record_usage(2).await;
        tracker.record_usage(7).await;
        // Subsequent writes in the same buckets must not reset the expiry.
        assert_eq!(store.expire_calls.load(Ordering::SeqCst), 2);

        let stats = tracker.stats().await;
        assert_eq!(stats.daily_requests, 11);
    }
}
