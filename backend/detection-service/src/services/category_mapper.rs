//! Deterministic mapping from detected labels to taxonomy categories/sizes
//!
//! Rule-based and order-sensitive: the first normalized candidate with a
//! rule match that resolves against the live taxonomy wins. No scoring,
//! no multi-rule merging.
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::debug;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::{CategorySizeMapping, EnhancedDetectedItem};
use crate::taxonomy::Taxonomy;

/// Free-text phrase -> (canonical category name, optional size name).
const CATEGORY_RULES: &[(&str, &str, Option<&str>)] = &[
    ("refrigerator", "Refrigerator", None),
    ("fridge", "Refrigerator", None),
    ("freezer", "Refrigerator", None),
    ("mini fridge", "Refrigerator", Some("Small")),
    ("tu lanh", "Refrigerator", None),
    ("tv", "TV/Monitor", None),
    ("television", "TV/Monitor", None),
    ("monitor", "TV/Monitor", None),
    ("tivi", "TV/Monitor", None),
    ("washing machine", "Washing Machine", None),
    ("washer", "Washing Machine", None),
    ("laundry machine", "Washing Machine", None),
    ("may giat", "Washing Machine", None),
    ("bed", "Bed", None),
    ("queen bed", "Bed", None),
    ("king bed", "Bed", None),
    ("double bed", "Bed", None),
    ("giuong", "Bed", None),
    ("wardrobe", "Wardrobe", None),
    ("closet", "Wardrobe", None),
    ("armoire", "Wardrobe", None),
    ("tu quan ao", "Wardrobe", None),
    ("desk", "Desk", None),
    ("work desk", "Desk", None),
    ("office desk", "Desk", None),
    ("dining table", "Dining Table", None),
    ("table", "Dining Table", None),
    ("ban an", "Dining Table", None),
    ("sofa", "Sofa", None),
    ("couch", "Sofa", None),
    ("loveseat", "Sofa", None),
    ("sectional", "Sofa", None),
    ("ghe sofa", "Sofa", None),
    ("cardboard box", "Cardboard Box", None),
    ("moving box", "Cardboard Box", None),
    ("box", "Cardboard Box", None),
    ("carton", "Cardboard Box", None),
    ("thung carton", "Cardboard Box", None),
    ("appliance", "Other", None),
    ("furniture", "Other", None),
];

static RULES: Lazy<HashMap<&'static str, (&'static str, Option<&'static str>)>> =
    Lazy::new(|| {
        CATEGORY_RULES
            .iter()
            .map(|(phrase, category, size)| (*phrase, (*category, *size)))
            .collect()
    });

/// Resolve a detected item to taxonomy identifiers.
///
/// Returns an empty mapping when no candidate token matches a rule whose
/// category exists in the taxonomy.
pub fn map_category(item: &EnhancedDetectedItem, taxonomy: &Taxonomy) -> CategorySizeMapping {
    for candidate in collect_candidates(item) {
        let Some(&(category_name, size_name)) = RULES.get(candidate.as_str()) else {
            continue;
        };

        let Some(category) = taxonomy.find_category(category_name) else {
            debug!(
                candidate = %candidate,
                category_name,
                "Mapping rule category not in taxonomy"
            );
            continue;
        };

        let size_id = size_name.and_then(|size| taxonomy.find_size(category.category_id, size));
        return CategorySizeMapping {
            category_id: Some(category.category_id),
            size_id,
        };
    }

    CategorySizeMapping::empty()
}

/// Candidate tokens in priority order: category, subcategory, name, notes;
/// each normalized phrase followed by its individual words of length >= 3.
/// First-seen order, de-duplicated.
fn collect_candidates(item: &EnhancedDetectedItem) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    let fields = [
        Some(item.category.as_str()),
        item.subcategory.as_deref(),
        Some(item.name.as_str()),
        item.notes.as_deref(),
    ];

    for field in fields.into_iter().flatten() {
        let Some(normalized) = normalize(field) else {
            continue;
        };

        push_unique(&mut candidates, normalized.clone());

        let words: Vec<&str> = normalized.split(' ').collect();
        if words.len() > 1 {
            for word in words {
                if word.len() >= 3 {
                    push_unique(&mut candidates, word.to_string());
                }
            }
        }
    }

    candidates
}

fn push_unique(candidates: &mut Vec<String>, candidate: String) {
    if !candidates.iter().any(|c| *c == candidate) {
        candidates.push(candidate);
    }
}

/// Lowercase, strip diacritics (NFD, combining marks removed), replace
/// non-alphanumerics with spaces, collapse whitespace.
fn normalize(value: &str) -> Option<String> {
    let stripped: String = value
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();
    let cleaned: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
