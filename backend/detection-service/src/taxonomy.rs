//! Category/size taxonomy loaded once at startup
use serde::{Deserialize, Serialize};

/// A size option scoped to one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub size_id: i64,
    pub name: String,
}

/// One inventory category with its localized and English names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category_id: i64,
    /// Localized display name
    pub name: String,
    /// English name, preferred for rule matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    #[serde(default)]
    pub sizes: Vec<SizeEntry>,
}

/// Immutable category/size lookup built at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    categories: Vec<CategoryEntry>,
}

impl Taxonomy {
    pub fn new(categories: Vec<CategoryEntry>) -> Self {
        Self { categories }
    }

    /// Resolve a canonical category name, case-insensitively: the English
    /// name takes priority, the localized name is the fallback.
    pub fn find_category(&self, name: &str) -> Option<&CategoryEntry> {
        let target = name.to_lowercase();
        self.categories
            .iter()
            .find(|c| {
                c.name_en
                    .as_deref()
                    .is_some_and(|en| en.to_lowercase() == target)
            })
            .or_else(|| {
                self.categories
                    .iter()
                    .find(|c| c.name.to_lowercase() == target)
            })
    }

    /// Resolve a size name scoped to a category.
    pub fn find_size(&self, category_id: i64, name: &str) -> Option<i64> {
        let target = name.to_lowercase();
        self.categories
            .iter()
            .find(|c| c.category_id == category_id)?
            .sizes
            .iter()
            .find(|s| s.name.to_lowercase() == target)
            .map(|s| s.size_id)
    }

    pub fn categories(&self) -> &[CategoryEntry] {
        &self.categories
    }

    /// Built-in moving-inventory catalog, used when no taxonomy file is
    /// configured.
    pub fn default_catalog() -> Self {
        fn sizes(base: i64) -> Vec<SizeEntry> {
            ["Small", "Medium", "Large"]
                .iter()
                .enumerate()
                .map(|(i, name)| SizeEntry {
                    size_id: base + i as i64,
                    name: name.to_string(),
                })
                .collect()
        }

        let entries = [
            (1, "Tủ lạnh", "Refrigerator", true),
            (2, "Tivi / Màn hình", "TV/Monitor", false),
            (3, "Máy giặt", "Washing Machine", false),
            (4, "Giường", "Bed", false),
            (5, "Tủ quần áo", "Wardrobe", false),
            (6, "Bàn làm việc", "Desk", false),
            (7, "Bàn ăn", "Dining Table", false),
            (8, "Ghế sofa", "Sofa", true),
            (9, "Thùng carton", "Cardboard Box", true),
            (10, "Khác", "Other", false),
        ];

        Self::new(
            entries
                .iter()
                .map(|(id, name, name_en, sized)| CategoryEntry {
                    category_id: *id,
                    name: name.to_string(),
                    name_en: Some(name_en.to_string()),
                    sizes: if *sized { sizes(id * 100) } else { Vec::new() },
                })
                .collect(),
        )
    }
}
