//! Assembly of detected items into persistence-ready line items
//!
//! Maps an enriched detection payload into a booking line item plus a
//! serialized metadata blob carrying every auxiliary attribute.
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{BookingLineItem, EnhancedDetectedItem};

pub struct ItemAssembler;

impl ItemAssembler {
    /// Map a detected item into a partially populated booking line item.
    ///
    /// Quantity is forced to 1: AI-sourced multiplicity is expressed via
    /// repeated entries, not a quantity field. Handling flags are carried
    /// only when explicitly present.
    pub fn to_line_item(
        item: &EnhancedDetectedItem,
        booking_id: i64,
        category_id: Option<i64>,
        size_id: Option<i64>,
    ) -> BookingLineItem {
        let dims = item.dims_cm.as_ref();
        BookingLineItem {
            booking_id,
            category_id,
            size_id,
            name: item.name.clone(),
            description: item.notes.clone(),
            quantity: 1,
            height_cm: dims.and_then(|d| d.height).map(f64::from),
            width_cm: dims.and_then(|d| d.width).map(f64::from),
            depth_cm: dims.and_then(|d| d.length).map(f64::from),
            weight_kg: item.weight_kg,
            is_fragile: item.fragile,
            requires_disassembly: item.disassembly_required,
            ai_metadata: None,
        }
    }

    /// Serialize auxiliary detection attributes for storage alongside the
    /// line item. Null fields and empty collections are omitted; an empty
    /// payload yields `None`, as does a serialization failure.
    pub fn to_metadata_json(item: &EnhancedDetectedItem) -> Option<String> {
        let mut metadata = Map::new();

        put(&mut metadata, "confidence", &Some(item.confidence));
        put(&mut metadata, "subcategory", &item.subcategory);
        if let Some(bbox) = item.bbox_norm.as_ref().filter(|bbox| !bbox.is_empty()) {
            put(&mut metadata, "bbox_norm", &Some(bbox));
        }
        put(&mut metadata, "dims_confidence", &item.dims_confidence);
        put(&mut metadata, "dimensions_basis", &item.dimensions_basis);
        put(&mut metadata, "volume_m3", &item.volume_m3);
        put(&mut metadata, "weight_confidence", &item.weight_confidence);
        put(&mut metadata, "weight_basis", &item.weight_basis);
        put(&mut metadata, "weight_model", &item.weight_model);
        put(&mut metadata, "occluded_fraction", &item.occluded_fraction);
        put(&mut metadata, "orientation", &item.orientation);
        if let Some(material) = item.material.as_ref().filter(|m| !m.is_empty()) {
            put(&mut metadata, "material", &Some(material));
        }
        put(&mut metadata, "color", &item.color);
        put(&mut metadata, "room_hint", &item.room_hint);
        put(&mut metadata, "brand", &item.brand);
        put(&mut metadata, "model", &item.model);
        put(&mut metadata, "two_person_lift", &item.two_person_lift);
        put(&mut metadata, "stackable", &item.stackable);
        put(&mut metadata, "notes", &item.notes);
        put(&mut metadata, "image_index", &item.image_index);

        if metadata.is_empty() {
            return None;
        }

        match serde_json::to_string(&Value::Object(metadata)) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(item = %item.name, error = %e, "Failed to serialize item metadata");
                None
            }
        }
    }
}

fn put<T: Serialize>(metadata: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    let Some(value) = value else {
        return;
    };
    match serde_json::to_value(value) {
        Ok(Value::Null) => {}
        Ok(json) => {
            metadata.insert(key.to_string(), json);
        }
        Err(e) => warn!(key, error = %e, "Failed to serialize metadata field"),
    }
}
