//! Detection Service - AI item detection pipeline for moving-service intake
//!
//! This service provides:
//! - Vision-model detection of household items from customer photos
//! - Cache-aside reuse of previous detections (Redis-backed)
//! - Usage-budget tracking with hour/day buckets and spend warnings
//! - Deterministic mapping of detected labels to the category/size taxonomy
//! - Assembly of detected items into booking line items

pub mod config;
pub mod models;
pub mod prompts;
pub mod providers;
pub mod services;
pub mod store;
pub mod taxonomy;

pub use config::Config;
pub use models::{
    BookingLineItem, BoundingBox, BudgetStats, CategorySizeMapping, DetectedItem, DetectionResult,
    Dimensions, EnhancedDetectedItem, ImageReference,
};
pub use providers::{OpenAiVisionClient, VisionDetector};
pub use services::{
    detection_cache_key, map_category, BudgetTracker, DetectionCache, DetectionOrchestrator,
    ItemAssembler,
};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use taxonomy::{CategoryEntry, SizeEntry, Taxonomy};

/// Detection service error types
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Vision API error: {0}")]
    VisionApi(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DetectionError {
    fn from(err: anyhow::Error) -> Self {
        DetectionError::Internal(err.to_string())
    }
}
