//! Detection prompt templates
//!
//! Two verbosity modes: the detailed prompt asks for dimension/weight
//! estimates and handling attributes and gets a larger reply budget; the
//! compact prompt only asks for the basic item list.

/// Full prompt for moving-inventory detection.
pub const DETAILED_DETECTION_PROMPT: &str = r#"You are an inventory assistant for a household moving service. Analyze the photo and list every movable household item you can identify.

Respond with a JSON object of the form {"items": [...]} and nothing else. Each element of "items" describes one distinct item:

{
  "id": "string, optional stable identifier",
  "name": "short item name, e.g. 'Three-Seat Sofa'",
  "category": "one of: furniture, appliance, electronics, box, other",
  "subcategory": "optional finer-grained type, e.g. 'sofa', 'refrigerator'",
  "quantity": 1,
  "confidence": 0.0-1.0,
  "bbox_norm": {"x_min": 0.0, "y_min": 0.0, "x_max": 1.0, "y_max": 1.0},
  "dims_cm": {"length": 0, "width": 0, "height": 0},
  "dims_confidence": 0.0-1.0,
  "dimensions_basis": "how the dimensions were estimated",
  "weight_kg": 0.0,
  "weight_confidence": 0.0-1.0,
  "weight_basis": "how the weight was estimated",
  "fragile": false,
  "two_person_lift": false,
  "stackable": false,
  "disassembly_required": false,
  "orientation": "upright | on_side | unknown",
  "color": "dominant color",
  "material": ["wood", "metal", ...],
  "occluded_fraction": 0.0-1.0,
  "room_hint": "living_room | bedroom | kitchen | office | other",
  "brand": "visible brand, omit if unreadable",
  "model": "visible model, omit if unreadable",
  "notes": "anything a moving crew should know"
}

Rules:
- List each distinct physical item once; use repeated entries rather than quantity for items that differ.
- Estimate dimensions and weight from typical retail specifications for the item type; flag low-certainty estimates through dims_confidence and weight_confidence.
- Omit any field you cannot determine instead of guessing.
- Ignore fixed fixtures (walls, built-in cabinets, radiators) and people."#;

/// Compact prompt for basic item listing.
pub const DETECTION_PROMPT: &str = r#"You are an inventory assistant for a household moving service. List every movable household item in the photo.

Respond with a JSON object of the form {"items": [...]} and nothing else. Each element:

{
  "name": "short item name",
  "category": "one of: furniture, appliance, electronics, box, other",
  "quantity": 1,
  "confidence": 0.0-1.0
}

Ignore fixed fixtures and people."#;
