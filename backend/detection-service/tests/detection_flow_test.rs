//! Detection Flow Integration Tests
//!
//! Purpose: Verify the complete detection flow from image references to
//! booking line items, over the in-process store and a scripted vision
//! detector.
//!
//! Test Coverage:
//! 1. Low-confidence detection flags review, caches, and reuses the cache
//!    for a reordered submission without re-invoking the model
//! 2. The credential-less stub path produces a cacheable result
//! 3. Detected items map and assemble into booking line items
//! 4. Cache corruption falls back to a fresh detection
//!
//! Run: cargo test --test detection_flow_test

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use detection_service::{
    detection_cache_key, map_category, BudgetTracker, Config, DetectionCache, DetectionError,
    DetectionOrchestrator, DetectionResult, EnhancedDetectedItem, ImageReference, ItemAssembler,
    KeyValueStore, MemoryStore, OpenAiVisionClient, Taxonomy, VisionDetector,
};

fn test_config() -> Config {
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

/// Vision detector returning one fixed item, counting invocations.
struct SingleItemVision {
    calls: AtomicUsize,
    confidence: f64,
}

impl SingleItemVision {
    fn new(confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            confidence,
        })
    }
}

#[async_trait]
impl VisionDetector for SingleItemVision {
    async fn detect_items(
        &self,
        _images: &[ImageReference],
    ) -> Result<DetectionResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let enhanced = vec![EnhancedDetectedItem {
            id: Some("item-1-1".to_string()),
            name: "Wooden Wardrobe".to_string(),
            category: "furniture".to_string(),
            subcategory: Some("wardrobe".to_string()),
            confidence: self.confidence,
            image_index: Some(0),
            ..Default::default()
        }];
        Ok(DetectionResult {
            items: enhanced.iter().map(EnhancedDetectedItem::to_basic).collect(),
            enhanced_items: enhanced,
            confidence: self.confidence,
            service_used: "OPENAI_VISION".to_string(),
            fallback_used: false,
            manual_input_required: false,
            manual_review_required: false,
            from_cache: false,
            failure_reason: None,
            processing_time_ms: 0,
            image_count: 0,
            image_refs: Vec::new(),
        })
    }

    fn is_configured(&self) -> bool {
        true
    }
}

fn build_orchestrator(
    vision: Arc<dyn VisionDetector>,
    store: Arc<MemoryStore>,
) -> DetectionOrchestrator {
    let config = test_config();
    DetectionOrchestrator::new(
        vision,
        DetectionCache::new(store.clone()),
        BudgetTracker::new(store, &config),
        &config,
    )
}

#[tokio::test]
async fn test_low_confidence_flow_with_reordered_cache_hit() {
    let vision = SingleItemVision::new(0.40);
    let store = Arc::new(MemoryStore::new());
    let orchestrator = build_orchestrator(vision.clone(), store.clone());

    let images = vec![
        ImageReference::Url("https://cdn.example.com/room-a.jpg".to_string()),
        ImageReference::Url("https://cdn.example.com/room-b.jpg".to_string()),
    ];

    // First call: detected below threshold, flagged for review, cached.
    let first = orchestrator.detect_items(&images).await;
    assert_eq!(first.items.len(), 1);
    assert!(first.manual_review_required);
    assert!(!first.manual_input_required);
    assert!(!first.from_cache);
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    assert!(store.exists(&detection_cache_key(&images)).await.unwrap());
    assert_eq!(orchestrator.budget_stats().await.daily_requests, 2);

    // Second call with the same references in reverse order: cache hit,
    // no new vision invocation, no budget increment.
    let reversed: Vec<ImageReference> = images.iter().rev().cloned().collect();
    let second = orchestrator.detect_items(&reversed).await;
    assert!(second.from_cache);
    assert!(second.manual_review_required);
    assert_eq!(second.items, first.items);
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.budget_stats().await.daily_requests, 2);
}

#[tokio::test]
async fn test_stub_detection_flow_without_credentials() {
    let config = test_config();
    let vision = Arc::new(OpenAiVisionClient::new(&config));
    assert!(!vision.is_configured());

    let store = Arc::new(MemoryStore::new());
    let orchestrator = build_orchestrator(vision, store.clone());

    let images = vec![
        ImageReference::Url("https://cdn.example.com/living-room.jpg".to_string()),
        ImageReference::Url("https://cdn.example.com/kitchen.jpg".to_string()),
    ];

    let result = orchestrator.detect_items(&images).await;
    assert_eq!(result.service_used, "OPENAI_VISION_STUB");
    assert!(result.fallback_used);
    assert!(!result.manual_input_required);
    // Stub confidences stay above the 0.85 threshold, so no review flag.
    assert!(!result.manual_review_required);
    assert_eq!(result.items.len(), result.enhanced_items.len());
    assert_eq!(result.image_count, 2);
    // Cached like any successful detection.
    assert!(store.exists(&detection_cache_key(&images)).await.unwrap());
}

#[tokio::test]
async fn test_detected_items_map_and_assemble() {
    let config = test_config();
    let vision = Arc::new(OpenAiVisionClient::new(&config));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = build_orchestrator(vision, store);

    // Second stub template: a refrigerator.
    let images = vec![
        ImageReference::Url("https://cdn.example.com/a.jpg".to_string()),
        ImageReference::Url("https://cdn.example.com/b.jpg".to_string()),
    ];
    let result = orchestrator.detect_items(&images).await;

    let taxonomy = Taxonomy::default_catalog();
    let fridge = result
        .enhanced_items
        .iter()
        .find(|item| item.name == "Samsung Refrigerator")
        .expect("stub should detect a refrigerator");

    // The stub's generic "appliance" category is the highest-priority
    // candidate and resolves to the catch-all category; the item name is
    // only consulted for items without a rule-matching category.
    let mapping = map_category(fridge, &taxonomy);
    let other_id = taxonomy.find_category("Other").unwrap().category_id;
    assert_eq!(mapping.category_id, Some(other_id));
    assert_eq!(mapping.size_id, None);

    // An item whose category carries no rule falls through to the name.
    let named_only = EnhancedDetectedItem {
        category: "kitchen".to_string(),
        ..fridge.clone()
    };
    let refrigerator_id = taxonomy.find_category("Refrigerator").unwrap().category_id;
    assert_eq!(
        map_category(&named_only, &taxonomy).category_id,
        Some(refrigerator_id)
    );

    let mut line =
        ItemAssembler::to_line_item(fridge, 7, mapping.category_id, mapping.size_id);
    line.ai_metadata = ItemAssembler::to_metadata_json(fridge);

    assert_eq!(line.booking_id, 7);
    assert_eq!(line.quantity, 1);
    assert_eq!(line.name, "Samsung Refrigerator");
    assert_eq!(line.category_id, Some(other_id));
    let metadata = line.ai_metadata.expect("metadata blob should be present");
    let value: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(value["confidence"], 0.96);
    assert_eq!(value["image_index"], 1);
}

#[tokio::test]
async fn test_corrupt_cache_entry_triggers_fresh_detection() {
    let vision = SingleItemVision::new(0.95);
    let store = Arc::new(MemoryStore::new());
    let orchestrator = build_orchestrator(vision.clone(), store.clone());

    let images = vec![ImageReference::Url(
        "https://cdn.example.com/garage.jpg".to_string(),
    )];
    let key = detection_cache_key(&images);

    store.set_ex(&key, "{broken payload", 3600).await.unwrap();

    let result = orchestrator.detect_items(&images).await;
    assert!(!result.from_cache);
    assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    // The corrupt entry was replaced by the fresh result.
    let cached = store.get(&key).await.unwrap().unwrap();
    assert!(serde_json::from_str::<DetectionResult>(&cached).is_ok());
}
