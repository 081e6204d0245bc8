//! Locker payload.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Locker {
    pub request_id: String,
    pub locale: String,
    pub player_name: String,
    pub user_name: String,
    pub items: Vec<LockerItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockerItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub rarity: String,
    pub rarity_color: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub source: String,
}

/// How an item was obtained. Sent as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SourceType {
    #[default]
    Other,
    VBucks,
    BattlePassPaid,
    BattlePassFree,
}

impl SourceType {
    /// Asset file stem for the source icon, `None` for `Other`.
    pub fn icon_name(&self) -> Option<&'static str> {
        match self {
            SourceType::Other => None,
            SourceType::VBucks => Some("VBucks"),
            SourceType::BattlePassPaid => Some("BattlePassPaid"),
            SourceType::BattlePassFree => Some("BattlePassFree"),
        }
    }
}

impl TryFrom<i64> for SourceType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SourceType::Other),
            1 => Ok(SourceType::VBucks),
            2 => Ok(SourceType::BattlePassPaid),
            3 => Ok(SourceType::BattlePassFree),
            other => Err(format!("unknown source type {}", other)),
        }
    }
}

impl From<SourceType> for i64 {
    fn from(value: SourceType) -> Self {
        match value {
            SourceType::Other => 0,
            SourceType::VBucks => 1,
            SourceType::BattlePassPaid => 2,
            SourceType::BattlePassFree => 3,
        }
    }
}
