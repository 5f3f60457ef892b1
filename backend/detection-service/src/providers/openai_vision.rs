//! OpenAI chat-completions vision client
//!
//! Sends one single-turn request per image (prompt + inline image data)
//! and tolerantly parses the JSON reply into enriched item records. When
//! no API key is configured, a deterministic stub keeps downstream
//! integration testable without live credentials.
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::{
    BoundingBox, DetectionResult, Dimensions, EnhancedDetectedItem, ImageReference,
};
use crate::prompts::{DETAILED_DETECTION_PROMPT, DETECTION_PROMPT};
use crate::providers::VisionDetector;
use crate::DetectionError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Service tag for live detections.
pub const SERVICE_OPENAI_VISION: &str = "OPENAI_VISION";
/// Service tag for the credential-less stub path.
pub const SERVICE_OPENAI_VISION_STUB: &str = "OPENAI_VISION_STUB";

/// OpenAI Vision API client
pub struct OpenAiVisionClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    use_detailed_prompt: bool,
}

// ============================================
// Request types
// ============================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPart },
}

#[derive(Debug, Serialize)]
struct ImageUrlPart {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

// ============================================
// Response types
// ============================================

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: ChatResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_millis(config.openai_timeout_ms))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: config.openai_api_key.clone(),
            api_url: config.openai_api_url.clone(),
            model: config.openai_model.clone(),
            use_detailed_prompt: config.use_detailed_prompt,
        }
    }

    /// Build the full chat-completions endpoint from the configured base
    /// URL. Accepts either a base (https://api.openai.com/v1) or the full
    /// endpoint.
    fn chat_completions_url(&self) -> String {
        let mut base = self.api_url.trim();
        if base.is_empty() {
            base = "https://api.openai.com/v1";
        }
        if base.to_lowercase().contains("/chat/completions") {
            return base.to_string();
        }
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    /// Analyze one image; a failure here never aborts the batch.
    async fn analyze_image(
        &self,
        image: &ImageReference,
        image_index: usize,
    ) -> Result<Vec<EnhancedDetectedItem>> {
        let (base64_image, mime_type) = self.resolve_image_payload(image).await?;

        let prompt = if self.use_detailed_prompt {
            DETAILED_DETECTION_PROMPT
        } else {
            DETECTION_PROMPT
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrlPart {
                            url: format!("data:{mime_type};base64,{base64_image}"),
                        },
                    },
                ],
            }],
            temperature: 0.4,
            max_tokens: if self.use_detailed_prompt { 4096 } else { 1024 },
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call OpenAI Vision API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                image_index,
                error = %error_text,
                "OpenAI Vision HTTP error, skipping image"
            );
            return Ok(Vec::new());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI Vision response body")?;

        if let Some(api_error) = chat_response.error {
            error!(
                image_index,
                error_type = api_error.error_type.as_deref().unwrap_or("unknown"),
                message = %api_error.message,
                "OpenAI Vision API error, skipping image"
            );
            return Ok(Vec::new());
        }

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        debug!(image_index, raw = %content, "OpenAI Vision raw reply");
        Ok(parse_items(&content, image_index))
    }

    /// Resolve an image reference to a base64 payload and MIME type.
    /// Inline data is used directly; a remote URL is fetched and
    /// re-encoded.
    async fn resolve_image_payload(&self, image: &ImageReference) -> Result<(String, String)> {
        match image {
            ImageReference::Inline { mime_type, data } => {
                Ok((data.clone(), mime_type.clone()))
            }
            ImageReference::Url(url) => {
                let bytes = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Cannot fetch image: {url}"))?
                    .error_for_status()
                    .with_context(|| format!("Cannot fetch image: {url}"))?
                    .bytes()
                    .await
                    .with_context(|| format!("Cannot read image body: {url}"))?;
                Ok((BASE64.encode(&bytes), "image/jpeg".to_string()))
            }
        }
    }

    /// Deterministic stub used when no API key is configured.
    fn stub_result(&self, images: &[ImageReference]) -> DetectionResult {
        warn!("OpenAI API key not configured - using stub implementation");

        let mut enhanced = Vec::new();
        for i in 0..images.len() {
            match i % 4 {
                0 => {
                    enhanced.push(stub_item("stub-sofa", "Three-Seat Sofa", "furniture", 0.94, i));
                    enhanced.push(stub_item("stub-table", "Coffee Table", "furniture", 0.91, i));
                }
                1 => enhanced.push(stub_item(
                    "stub-fridge",
                    "Samsung Refrigerator",
                    "appliance",
                    0.96,
                    i,
                )),
                2 => {
                    enhanced.push(stub_item("stub-laptop", "Dell Laptop", "electronics", 0.93, i));
                    enhanced.push(stub_item("stub-mouse", "Wireless Mouse", "electronics", 0.89, i));
                }
                _ => enhanced.push(stub_item("stub-box", "Cardboard Box", "box", 0.87, i)),
            }
        }

        build_result(enhanced, SERVICE_OPENAI_VISION_STUB, true)
    }
}

#[async_trait]
impl VisionDetector for OpenAiVisionClient {
    async fn detect_items(
        &self,
        images: &[ImageReference],
    ) -> Result<DetectionResult, DetectionError> {
        info!(model = %self.model, images = images.len(), "OpenAI Vision detection started");

        if !self.is_configured() {
            return Ok(self.stub_result(images));
        }

        let mut enhanced = Vec::new();
        for (i, image) in images.iter().enumerate() {
            match self.analyze_image(image, i).await {
                Ok(items) => enhanced.extend(items),
                Err(e) => {
                    error!(
                        image_index = i,
                        image = %image.label(i),
                        error = %e,
                        "Image analysis failed, skipping"
                    );
                }
            }
        }

        let result = build_result(enhanced, SERVICE_OPENAI_VISION, false);
        info!(
            items = result.items.len(),
            confidence = result.confidence,
            "OpenAI Vision detection complete"
        );
        Ok(result)
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Assemble a detection result from enriched items: simplified projection
/// plus aggregate confidence. Latency and image bookkeeping are stamped by
/// the orchestrator.
fn build_result(
    enhanced: Vec<EnhancedDetectedItem>,
    service: &str,
    fallback_used: bool,
) -> DetectionResult {
    let items = enhanced.iter().map(EnhancedDetectedItem::to_basic).collect();
    let confidence = aggregate_confidence(&enhanced);
    DetectionResult {
        items,
        enhanced_items: enhanced,
        confidence,
        service_used: service.to_string(),
        fallback_used,
        manual_input_required: false,
        manual_review_required: false,
        from_cache: false,
        failure_reason: None,
        processing_time_ms: 0,
        image_count: 0,
        image_refs: Vec::new(),
    }
}

/// Mean of per-item confidences, negative values excluded; 0.92 when no
/// item contributes.
fn aggregate_confidence(items: &[EnhancedDetectedItem]) -> f64 {
    let confidences: Vec<f64> = items
        .iter()
        .map(|item| item.confidence)
        .filter(|c| *c >= 0.0)
        .collect();
    if confidences.is_empty() {
        return 0.92;
    }
    confidences.iter().sum::<f64>() / confidences.len() as f64
}

fn stub_item(
    id_prefix: &str,
    name: &str,
    category: &str,
    confidence: f64,
    image_index: usize,
) -> EnhancedDetectedItem {
    EnhancedDetectedItem {
        id: Some(format!("{}-{}", id_prefix, image_index + 1)),
        name: name.to_string(),
        category: category.to_string(),
        confidence,
        quantity: 1,
        image_index: Some(image_index),
        ..Default::default()
    }
}

// ============================================
// Reply parsing
// ============================================

/// Strip optional triple-backtick fencing around the model reply.
fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse the model's textual reply into enriched items.
///
/// Accepted shapes, in order: an object with an `items` array, a bare
/// array, a single item object. Individual items are decoded tolerantly;
/// one malformed entry never discards the rest.
fn parse_items(text: &str, image_index: usize) -> Vec<EnhancedDetectedItem> {
    let cleaned = strip_code_fences(text);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(e) => {
            warn!(image_index, error = %e, "Failed to parse model reply as JSON");
            return Vec::new();
        }
    };

    let raw_items = match value {
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove("items") {
                items
            } else {
                // Single-object fallback: treat the object itself as one item.
                vec![Value::Object(map)]
            }
        }
        Value::Array(items) => items,
        _ => {
            warn!(image_index, "Unexpected model reply shape");
            return Vec::new();
        }
    };

    let mut items: Vec<EnhancedDetectedItem> = raw_items
        .iter()
        .filter_map(Value::as_object)
        .map(|raw| parse_enhanced_item(raw, image_index))
        .collect();
    enrich_items(&mut items, image_index);
    items
}

/// Decode one raw item, accepting numbers and booleans from either native
/// type or string representation; unknown fields are ignored.
fn parse_enhanced_item(
    raw: &serde_json::Map<String, Value>,
    image_index: usize,
) -> EnhancedDetectedItem {
    let mut item = EnhancedDetectedItem {
        id: string_field(raw, "id"),
        name: string_field(raw, "name").unwrap_or_else(|| "Unknown Item".to_string()),
        category: string_field(raw, "category").unwrap_or_else(|| "other".to_string()),
        subcategory: string_field(raw, "subcategory"),
        quantity: u32_field(raw, "quantity").unwrap_or(1).max(1),
        confidence: f64_field(raw, "confidence").unwrap_or(0.85),
        image_index: Some(image_index),
        bbox_norm: raw
            .get("bbox_norm")
            .and_then(Value::as_object)
            .map(|bbox| BoundingBox {
                x_min: f64_field(bbox, "x_min"),
                y_min: f64_field(bbox, "y_min"),
                x_max: f64_field(bbox, "x_max"),
                y_max: f64_field(bbox, "y_max"),
            })
            .filter(|bbox| !bbox.is_empty()),
        dims_cm: raw
            .get("dims_cm")
            .and_then(Value::as_object)
            .map(|dims| Dimensions {
                length: u32_field(dims, "length"),
                width: u32_field(dims, "width"),
                height: u32_field(dims, "height"),
            })
            .filter(|dims| {
                dims.length.is_some() || dims.width.is_some() || dims.height.is_some()
            }),
        dims_confidence: f64_field(raw, "dims_confidence"),
        dimensions_basis: string_field(raw, "dimensions_basis"),
        volume_m3: f64_field(raw, "volume_m3"),
        weight_kg: f64_field(raw, "weight_kg"),
        weight_confidence: f64_field(raw, "weight_confidence"),
        weight_basis: string_field(raw, "weight_basis"),
        weight_model: Some(
            string_field(raw, "weight_model").unwrap_or_else(|| "house-move-v1".to_string()),
        ),
        fragile: bool_field(raw, "fragile"),
        two_person_lift: bool_field(raw, "two_person_lift"),
        stackable: bool_field(raw, "stackable"),
        disassembly_required: bool_field(raw, "disassembly_required"),
        occluded_fraction: f64_field(raw, "occluded_fraction"),
        orientation: string_field(raw, "orientation"),
        color: string_field(raw, "color"),
        material: raw
            .get("material")
            .and_then(Value::as_array)
            .map(|materials| {
                materials
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .filter(|materials| !materials.is_empty()),
        room_hint: string_field(raw, "room_hint"),
        brand: string_field(raw, "brand"),
        model: string_field(raw, "model"),
        notes: string_field(raw, "notes"),
    };

    if item.volume_m3.is_none() {
        item.volume_m3 = item.volume_from_dims();
    }

    item
}

/// Backfill missing defaults after parsing: fallback ids and image index.
fn enrich_items(items: &mut [EnhancedDetectedItem], image_index: usize) {
    for (idx, item) in items.iter_mut().enumerate() {
        if item.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            item.id = Some(format!("item-{}-{}", image_index + 1, idx + 1));
        }
        if item.image_index.is_none() {
            item.image_index = Some(image_index);
        }
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn f64_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn u32_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<u32> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(api_key: &str) -> Config {
        Config {
            openai_api_key: api_key.to_string(),
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
    fn test_client_not_configured() {
        let client = OpenAiVisionClient::new(&test_config(""));
        assert!(!client.is_configured());
    }

    #[test]
    fn test_client_configured() {
        let client = OpenAiVisionClient::new(&test_config("test-api-key"));
        assert!(client.is_configured());
    }

    #[test]
    fn test_chat_completions_url_variants() {
        let mut config = test_config("k");
        let client = OpenAiVisionClient::new(&config);
        assert_eq!(
            client.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );

        config.openai_api_url = "https://proxy.internal/v1/".to_string();
        let client = OpenAiVisionClient::new(&config);
        assert_eq!(
            client.chat_completions_url(),
            "https://proxy.internal/v1/chat/completions"
        );

        config.openai_api_url = "https://proxy.internal/v1/chat/completions".to_string();
        let client = OpenAiVisionClient::new(&config);
        assert_eq!(
            client.chat_completions_url(),
            "https://proxy.internal/v1/chat/completions"
        );
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
    }

    #[test]
    fn test_parse_items_object_shape() {
        let reply = r#"```json
        {"items": [
            {"name": "Sofa", "category": "furniture", "confidence": 0.95,
             "dims_cm": {"length": 200, "width": 90, "height": 80},
             "fragile": false, "material": ["fabric", "wood"]},
            {"name": "Lamp", "confidence": "0.7", "quantity": "2", "fragile": "true"}
        ]}
        ```"#;
        let items = parse_items(reply, 0);
        assert_eq!(items.len(), 2);

        let sofa = &items[0];
        assert_eq!(sofa.id.as_deref(), Some("item-1-1"));
        assert_eq!(sofa.name, "Sofa");
        assert_eq!(sofa.fragile, Some(false));
        assert_eq!(sofa.material.as_deref(), Some(&["fabric".to_string(), "wood".to_string()][..]));
        // 200 x 90 x 80 cm
        assert_eq!(sofa.volume_m3, Some(1.44));

        let lamp = &items[1];
        assert_eq!(lamp.id.as_deref(), Some("item-1-2"));
        assert_eq!(lamp.category, "other");
        assert_eq!(lamp.confidence, 0.7);
        assert_eq!(lamp.quantity, 2);
        assert_eq!(lamp.fragile, Some(true));
        assert_eq!(lamp.image_index, Some(0));
    }

    #[test]
    fn test_parse_items_bare_array_shape() {
        let reply = r#"[{"name": "Desk", "category": "furniture"}]"#;
        let items = parse_items(reply, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_deref(), Some("item-3-1"));
        assert_eq!(items[0].confidence, 0.85);
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[0].image_index, Some(2));
    }

    #[test]
    fn test_parse_items_single_object_fallback() {
        let reply = r#"{"name": "Wardrobe", "category": "furniture", "confidence": 0.8}"#;
        let items = parse_items(reply, 0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Wardrobe");
    }

    #[test]
    fn test_parse_items_invalid_json() {
        assert!(parse_items("not json at all", 0).is_empty());
        assert!(parse_items("", 0).is_empty());
        assert!(parse_items("42", 0).is_empty());
    }

    #[test]
    fn test_parse_item_defaults_and_invalid_values() {
        let reply = r#"{"items": [{"quantity": 0, "confidence": "not-a-number"}]}"#;
        let items = parse_items(reply, 0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Unknown Item");
        assert_eq!(items[0].category, "other");
        assert_eq!(items[0].quantity, 1);
        assert_eq!(items[0].confidence, 0.85);
        assert_eq!(items[0].weight_model.as_deref(), Some("house-move-v1"));
    }

    #[test]
    fn test_supplied_volume_not_overwritten() {
        let reply = r#"{"items": [{"name": "Box",
            "dims_cm": {"length": 100, "width": 100, "height": 100},
            "volume_m3": 0.5}]}"#;
        let items = parse_items(reply, 0);
        assert_eq!(items[0].volume_m3, Some(0.5));
    }

    #[test]
    fn test_aggregate_confidence() {
        assert_eq!(aggregate_confidence(&[]), 0.92);

        let items = vec![
            EnhancedDetectedItem {
                confidence: 0.9,
                ..Default::default()
            },
            EnhancedDetectedItem {
                confidence: 0.7,
                ..Default::default()
            },
            EnhancedDetectedItem {
                confidence: -1.0,
                ..Default::default()
            },
        ];
        let aggregate = aggregate_confidence(&items);
        assert!((aggregate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_stub_cycles_templates() {
        let client = OpenAiVisionClient::new(&test_config(""));
        let images: Vec<ImageReference> = (0..5)
            .map(|i| ImageReference::Url(format!("https://example.com/{i}.jpg")))
            .collect();
        let result = client.stub_result(&images);

        assert_eq!(result.service_used, SERVICE_OPENAI_VISION_STUB);
        assert!(result.fallback_used);
        // images 0 and 4 hit the two-item template, 1/2/3 add 1+2+1
        assert_eq!(result.enhanced_items.len(), 8);
        assert_eq!(result.items.len(), result.enhanced_items.len());
        assert_eq!(result.enhanced_items[0].id.as_deref(), Some("stub-sofa-1"));
        assert_eq!(result.enhanced_items[2].name, "Samsung Refrigerator");
        assert!(result.confidence > 0.8);
    }
}
