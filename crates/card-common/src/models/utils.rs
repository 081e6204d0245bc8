//! Payloads for the small utility images.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBar {
    /// Fill ratio, 0.0 to 1.0.
    pub progress: f32,
    pub text: String,
    #[serde(default)]
    pub bar_text: Option<String>,
    pub gradient_colors: Vec<String>,
}

/// Drop location on the island map, in world units.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropLocation {
    pub locale: String,
    pub x: i32,
    pub y: i32,
}
