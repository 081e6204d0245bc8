//! Item shop payload and the location data produced while laying out a shop template.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub date: String,
    pub title: String,
    pub creator_code_title: String,
    #[serde(default)]
    pub creator_code: Option<String>,
    #[serde(default)]
    pub background_image_path: Option<String>,
    /// Set by the backend when the daily rotation changed and cached templates must be rebuilt.
    #[serde(default)]
    pub new_shop: Option<bool>,
    #[serde(default = "default_locale")]
    pub locale: String,
    pub sections: Vec<ShopSection>,
}

fn default_locale() -> String {
    "en".to_string()
}

impl Shop {
    /// Hash of everything that affects the text-free template layout.
    ///
    /// Section ids, entry ids and entry sizes determine where every card goes, so two
    /// payloads with the same hash share a template.
    pub fn template_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for section in &self.sections {
            section.id.hash(&mut hasher);
            for entry in &section.entries {
                entry.id.hash(&mut hasher);
                entry.size.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    pub fn is_new_shop(&self) -> bool {
        self.new_shop.unwrap_or(false)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ShopEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sections.is_empty() {
            return Err("shop has no sections".to_string());
        }
        for section in &self.sections {
            if section.entries.is_empty() {
                return Err(format!("section '{}' has no entries", section.id));
            }
            for entry in &section.entries {
                if !(entry.size > 0.0) || entry.size > 4.0 {
                    return Err(format!("entry '{}' has invalid size {}", entry.id, entry.size));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSection {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub entries: Vec<ShopEntry>,
}

impl ShopSection {
    /// Width of the section in card columns.
    pub fn column_span(&self) -> u32 {
        self.entries.iter().map(|e| e.size).sum::<f32>().ceil() as u32
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopEntry {
    pub id: String,
    pub regular_price: String,
    pub final_price: String,
    #[serde(default)]
    pub banner: Option<ShopEntryBanner>,
    pub size: f32,
    #[serde(default)]
    pub background_colors: Option<Vec<String>>,
    #[serde(default)]
    pub text_background_color: Option<String>,
    pub name: String,
    #[serde(default)]
    pub image_type: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub fallback_image_url: String,
    #[serde(default)]
    pub is_special: bool,
}

impl ShopEntry {
    /// URL to fetch the card image from.
    pub fn image_source(&self) -> &str {
        self.image_url.as_deref().unwrap_or(&self.fallback_image_url)
    }

    /// Half-height cards occupy a fractional size (e.g. 0.5).
    pub fn is_half_height(&self) -> bool {
        self.size.fract() != 0.0
    }

    pub fn is_discounted(&self) -> bool {
        self.regular_price != self.final_price
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopEntryBanner {
    pub text: String,
    pub colors: Vec<String>,
}

/// Pixel position of a text element in the shop template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub max_width: Option<i32>,
}

impl LocationPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            max_width: None,
        }
    }

    pub fn with_max_width(x: i32, y: i32, max_width: i32) -> Self {
        Self {
            x,
            y,
            max_width: Some(max_width),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopSectionLocation {
    pub id: String,
    pub name: Option<LocationPoint>,
    pub entries: Vec<ShopEntryLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopEntryLocation {
    pub id: String,
    pub name: LocationPoint,
    pub price: LocationPoint,
    pub banner: Option<LocationPoint>,
}
