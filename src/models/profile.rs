//! Profile wire shapes and the normalized feature record.
//!
//! The analyze endpoint accepts loosely-typed profile JSON from game
//! clients; everything downstream works on `FeatureRecord`, which carries
//! exactly the fixed feature layout below.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Number of numeric features extracted per profile
pub const FEATURE_COUNT: usize = 8;

/// Feature names in the exact order they appear in the vector.
/// This is the single source of truth for the feature layout.
pub const FEATURE_LAYOUT: [&str; FEATURE_COUNT] = [
    "assists",
    "clutches",
    "deaths",
    "firstKills",
    "headshots",
    "kddiff",
    "kdr",
    "adr",
];

/// Raw profile as submitted in an analyze request.
///
/// Unknown fields are ignored. The canonical player identifier is `id`;
/// `steamId` is accepted as a legacy alias from older client builds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    pub id: Option<String>,
    #[serde(rename = "steamId")]
    pub steam_id: Option<String>,
    pub metrics: Option<ProfileMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileMetrics {
    pub level: Option<SkillLevel>,
    pub stats: Option<HashMap<String, serde_json::Value>>,
}

/// Skill level category; the wire accepts either a string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SkillLevel {
    Name(String),
    Rank(f64),
}

impl SkillLevel {
    /// Category key used for cohort grouping and cache keys.
    pub fn as_category(&self) -> String {
        match self {
            SkillLevel::Name(name) => name.clone(),
            SkillLevel::Rank(rank) => rank.to_string(),
        }
    }
}

impl RawProfile {
    /// Resolved player identifier, empty strings treated as absent.
    pub fn player_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.steam_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Normalized feature record. Immutable once built; also the persisted
/// cache shape (stored as schema-checked JSON, never evaluated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub level: String,
    pub features: [f64; FEATURE_COUNT],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
}
