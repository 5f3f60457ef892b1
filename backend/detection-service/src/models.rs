//! Data model for the detection pipeline
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================
// Image references
// ============================================

/// An image submitted to the detection pipeline.
///
/// Either a remote URL the vision service can download, or an inline
/// base64 payload with a declared MIME type. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageReference {
    Inline { mime_type: String, data: String },
    Url(String),
}

impl ImageReference {
    /// Parse a raw reference string. `data:<mime>;base64,<payload>` URIs
    /// become inline payloads; anything else is treated as a URL.
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("data:") {
            if let Some((header, payload)) = rest.split_once(',') {
                let mime_type = header
                    .split_once(';')
                    .map(|(mime, _)| mime)
                    .unwrap_or(header);
                if !mime_type.is_empty() && !payload.is_empty() {
                    return ImageReference::Inline {
                        mime_type: mime_type.to_string(),
                        data: payload.to_string(),
                    };
                }
            }
        }
        ImageReference::Url(raw.to_string())
    }

    /// Stable string form used for cache fingerprinting.
    pub fn canonical(&self) -> String {
        match self {
            ImageReference::Url(url) => url.clone(),
            ImageReference::Inline { mime_type, data } => {
                format!("data:{mime_type};base64,{data}")
            }
        }
    }

    /// Human-readable reference for logging and metadata. Inline payloads
    /// are identified by position and a truncated checksum rather than by
    /// their full contents.
    pub fn label(&self, index: usize) -> String {
        match self {
            ImageReference::Url(url) => url.clone(),
            ImageReference::Inline { data, .. } => {
                let checksum = hex::encode(Sha256::digest(data.as_bytes()));
                format!("upload://{}/{}", index, &checksum[..12])
            }
        }
    }
}

// ============================================
// Detected items
// ============================================

/// Simplified per-item view for lightweight consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedItem {
    pub name: String,
    pub category: String,
    pub confidence: f64,
}

/// Normalized bounding box (0-1 coordinates).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_max: Option<f64>,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.x_min.is_none() && self.y_min.is_none() && self.x_max.is_none() && self.y_max.is_none()
    }
}

/// Estimated item dimensions in centimeters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Full per-item record produced by the vision client.
///
/// Never mutated after enrichment except to backfill missing defaults
/// (id, image index, confidence, quantity, volume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedDetectedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_norm: Option<BoundingBox>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims_cm: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dims_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions_basis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_m3: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_basis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub two_person_lift: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stackable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disassembly_required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occluded_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

fn default_confidence() -> f64 {
    0.85
}

impl Default for EnhancedDetectedItem {
    fn default() -> Self {
        Self {
            id: None,
            name: "Unknown Item".to_string(),
            category: "other".to_string(),
            subcategory: None,
            quantity: 1,
            confidence: 0.85,
            image_index: None,
            bbox_norm: None,
            dims_cm: None,
            dims_confidence: None,
            dimensions_basis: None,
            volume_m3: None,
            weight_kg: None,
            weight_confidence: None,
            weight_basis: None,
            weight_model: None,
            fragile: None,
            two_person_lift: None,
            stackable: None,
            disassembly_required: None,
            occluded_fraction: None,
            orientation: None,
            color: None,
            material: None,
            room_hint: None,
            brand: None,
            model: None,
            notes: None,
        }
    }
}

impl EnhancedDetectedItem {
    /// Volume in cubic meters from centimeter dimensions, when all three
    /// are known.
    pub fn volume_from_dims(&self) -> Option<f64> {
        let dims = self.dims_cm.as_ref()?;
        let (l, w, h) = (dims.length?, dims.width?, dims.height?);
        Some((l as f64) * (w as f64) * (h as f64) / 1_000_000.0)
    }

    /// Project down to the simplified item view.
    pub fn to_basic(&self) -> DetectedItem {
        DetectedItem {
            name: self.name.clone(),
            category: self.category.clone(),
            confidence: self.confidence,
        }
    }
}

// ============================================
// Detection results
// ============================================

/// Outcome of one detection attempt.
///
/// Every pipeline path resolves to one of these; failures are expressed
/// through the flags and `failure_reason`, never as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub items: Vec<DetectedItem>,
    #[serde(default)]
    pub enhanced_items: Vec<EnhancedDetectedItem>,
    pub confidence: f64,
    pub service_used: String,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub manual_input_required: bool,
    #[serde(default)]
    pub manual_review_required: bool,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub image_count: usize,
    #[serde(default)]
    pub image_refs: Vec<ImageReference>,
}

impl DetectionResult {
    /// Terminal payload when automated detection cannot help and the
    /// customer must enter items manually.
    pub fn manual_input(refs: &[ImageReference], reason: &str, processing_time_ms: u64) -> Self {
        Self {
            items: Vec::new(),
            enhanced_items: Vec::new(),
            confidence: 0.0,
            service_used: "MANUAL_INPUT_REQUIRED".to_string(),
            fallback_used: true,
            manual_input_required: true,
            manual_review_required: false,
            from_cache: false,
            failure_reason: Some(reason.to_string()),
            processing_time_ms,
            image_count: refs.len(),
            image_refs: refs.to_vec(),
        }
    }
}

// ============================================
// Budget statistics
// ============================================

/// Vision usage statistics and budget tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStats {
    /// Number of analyzed images in the current hour
    pub hourly_requests: i64,
    /// Number of analyzed images today
    pub daily_requests: i64,
    /// Estimated cost in the current hour (USD)
    pub hourly_cost: f64,
    /// Estimated cost today (USD)
    pub daily_cost: f64,
    /// Hourly request limit
    pub hourly_limit: i64,
    /// Daily request limit
    pub daily_limit: i64,
    /// Daily cost limit (USD)
    pub daily_cost_limit: f64,
}

impl BudgetStats {
    pub fn is_hourly_limit_reached(&self) -> bool {
        self.hourly_requests >= self.hourly_limit
    }

    pub fn is_daily_limit_reached(&self) -> bool {
        self.daily_requests >= self.daily_limit
    }

    pub fn is_daily_cost_limit_reached(&self) -> bool {
        self.daily_cost >= self.daily_cost_limit
    }

    pub fn remaining_hourly_requests(&self) -> i64 {
        (self.hourly_limit - self.hourly_requests).max(0)
    }

    pub fn remaining_daily_requests(&self) -> i64 {
        (self.daily_limit - self.daily_requests).max(0)
    }

    pub fn remaining_daily_budget(&self) -> f64 {
        (self.daily_cost_limit - self.daily_cost).max(0.0)
    }
}

// ============================================
// Taxonomy mapping and line items
// ============================================

/// Category/size identifiers resolved from a detected label.
///
/// A size never appears without a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySizeMapping {
    pub category_id: Option<i64>,
    pub size_id: Option<i64>,
}

impl CategorySizeMapping {
    pub fn empty() -> Self {
        Self {
            category_id: None,
            size_id: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.category_id.is_some()
    }
}

/// Persistence-ready booking line item assembled from a detected item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingLineItem {
    pub booking_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_id: Option<i64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fragile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_disassembly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_metadata: Option<String>,
}
