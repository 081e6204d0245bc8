//! Player stats payload.

use serde::{Deserialize, Serialize};

/// Which stats card to render. Passed as the `type` query parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsType {
    #[default]
    #[serde(alias = "Normal", alias = "0")]
    Normal,
    #[serde(alias = "Competitive", alias = "1")]
    Competitive,
}

impl StatsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsType::Normal => "normal",
            StatsType::Competitive => "competitive",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub player_name: String,
    pub input_type: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub background_image_path: Option<String>,
    pub playtime: Playtime,
    pub battle_pass_level: f32,
    pub battle_pass_level_bar_colors: Vec<String>,
    #[serde(default)]
    pub competitive: Option<CompetitiveStats>,
    pub overall: StatsEntry,
    pub solo: StatsEntry,
    pub duos: StatsEntry,
    pub trios: StatsEntry,
    pub squads: StatsEntry,
    #[serde(default)]
    pub teams: Option<StatsEntry>,
}

impl Stats {
    /// Check the payload carries what the requested card type needs.
    pub fn validate_for(&self, stats_type: StatsType) -> Result<(), String> {
        match stats_type {
            StatsType::Normal if self.teams.is_none() => {
                Err("Normal stats type requested but no team stats were provided.".to_string())
            }
            StatsType::Competitive if self.competitive.is_none() => Err(
                "Competitive stats type requested but no competitive stats were provided."
                    .to_string(),
            ),
            _ => Ok(()),
        }
    }

    /// Battle pass progress within the current level, 0.0 to 1.0.
    pub fn battle_pass_progress(&self) -> f32 {
        self.battle_pass_level.fract().clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveStats {
    pub ranked_stats_entries: Vec<RankedStatsEntry>,
    pub earnings: String,
    pub power_ranking: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStatsEntry {
    pub ranking_type: RankedType,
    pub division: i32,
    pub division_name: String,
    pub progress: f32,
    #[serde(default)]
    pub ranking: Option<String>,
}

impl RankedStatsEntry {
    pub fn is_unranked(&self) -> bool {
        self.division_name.eq_ignore_ascii_case("unranked")
    }

    /// Asset file stem of the division icon.
    pub fn division_icon_name(&self) -> String {
        if self.is_unranked() {
            "Unranked".to_string()
        } else {
            self.division.to_string()
        }
    }
}

/// Ranked playlist. Sent as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RankedType {
    BattleRoyale,
    ZeroBuild,
}

impl RankedType {
    pub fn label(&self) -> &'static str {
        match self {
            RankedType::BattleRoyale => "Battle Royale",
            RankedType::ZeroBuild => "Zero Build",
        }
    }
}

impl TryFrom<i64> for RankedType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RankedType::BattleRoyale),
            1 => Ok(RankedType::ZeroBuild),
            other => Err(format!("unknown ranked type {}", other)),
        }
    }
}

impl From<RankedType> for i64 {
    fn from(value: RankedType) -> Self {
        match value {
            RankedType::BattleRoyale => 0,
            RankedType::ZeroBuild => 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub matches_played: String,
    pub wins: String,
    pub win_ratio: String,
    pub kills: String,
    #[serde(rename = "kd", alias = "KD")]
    pub kd: String,
    #[serde(default)]
    pub top25: Option<String>,
    #[serde(default)]
    pub top12: Option<String>,
    #[serde(default)]
    pub top6: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Playtime {
    pub days: String,
    pub hours: String,
    pub minutes: String,
}
