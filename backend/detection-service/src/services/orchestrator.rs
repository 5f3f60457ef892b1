//! Detection orchestration
//!
//! Composes cache lookup, vision invocation, confidence decisioning,
//! cache write-back and budget recording. Every path resolves to a
//! `DetectionResult` value; nothing here surfaces an error to the caller.
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::{DetectionResult, ImageReference};
use crate::providers::VisionDetector;
use crate::services::budget::BudgetTracker;
use crate::services::cache::DetectionCache;

/// Failure reason when the vision call itself failed.
pub const REASON_VISION_FAILED: &str = "OPENAI_VISION_FAILED";
/// Failure reason when the call succeeded but found nothing.
pub const REASON_NO_ITEMS: &str = "NO_ITEMS_DETECTED";
/// Failure reason attached to low-confidence results flagged for review.
pub const REASON_LOW_CONFIDENCE: &str = "OPENAI_VISION_LOW_CONFIDENCE";

/// Cache fingerprint for a set of image references.
///
/// References are sorted before hashing so the key is independent of
/// submission order; hashing bounds key size regardless of reference
/// count or payload size.
pub fn detection_cache_key(images: &[ImageReference]) -> String {
    let mut canonical: Vec<String> = images.iter().map(ImageReference::canonical).collect();
    canonical.sort();
    let digest = Sha256::digest(canonical.join("|").as_bytes());
    format!("ai:detection:{}", hex::encode(digest))
}

pub struct DetectionOrchestrator {
    vision: Arc<dyn VisionDetector>,
    cache: DetectionCache,
    budget: BudgetTracker,
    confidence_threshold: f64,
    cache_ttl_seconds: u64,
}

impl DetectionOrchestrator {
    pub fn new(
        vision: Arc<dyn VisionDetector>,
        cache: DetectionCache,
        budget: BudgetTracker,
        config: &Config,
    ) -> Self {
        Self {
            vision,
            cache,
            budget,
            confidence_threshold: config.confidence_threshold,
            cache_ttl_seconds: config.cache_ttl_seconds,
        }
    }

    /// Detect household items, with cache reuse and manual fallback.
    pub async fn detect_items(&self, images: &[ImageReference]) -> DetectionResult {
        let cache_key = detection_cache_key(images);

        if let Some(mut cached) = self.cache.get(&cache_key).await {
            info!(images = images.len(), "Cache hit - returning cached detection");
            cached.from_cache = true;
            return cached;
        }

        let start = Instant::now();
        info!(images = images.len(), "Vision detection started");

        let mut result = match self.vision.detect_items(images).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Vision detection failed");
                return DetectionResult::manual_input(
                    images,
                    REASON_VISION_FAILED,
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let latency = start.elapsed().as_millis() as u64;
        result.processing_time_ms = latency;
        result.image_count = images.len();
        result.image_refs = images.to_vec();

        if result.items.is_empty() {
            warn!("Vision detection returned no items - manual input required");
            // The attempt consumed the images even though nothing came back,
            // but an empty result is not worth remembering.
            self.budget.record_usage(images.len() as u32).await;
            return DetectionResult::manual_input(images, REASON_NO_ITEMS, latency);
        }

        info!(
            items = result.items.len(),
            confidence = result.confidence,
            latency_ms = latency,
            "Vision detection completed"
        );

        if result.confidence < self.confidence_threshold {
            warn!(
                confidence = result.confidence,
                threshold = self.confidence_threshold,
                "Low confidence - flagging manual review"
            );
            result.manual_review_required = true;
            result.failure_reason = Some(REASON_LOW_CONFIDENCE.to_string());
        }

        self.cache
            .put(&cache_key, &result, self.cache_ttl_seconds)
            .await;
        self.budget.record_usage(images.len() as u32).await;

        result
    }

    /// Budget snapshot pass-through for callers holding the orchestrator.
    pub async fn budget_stats(&self) -> crate::models::BudgetStats {
        self.budget.stats().await
    }
}
