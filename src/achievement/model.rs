use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::global::error::ApiError;

// ========================================================================
// Ranks and rarity
// ========================================================================

/// Ordered tier rank, bronze lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierRank {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl TierRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierRank::Bronze => "bronze",
            TierRank::Silver => "silver",
            TierRank::Gold => "gold",
            TierRank::Platinum => "platinum",
            TierRank::Diamond => "diamond",
        }
    }
}

impl fmt::Display for TierRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Rarity implied by a tier when the server sends none
    pub fn for_tier(tier: TierRank) -> Self {
        match tier {
            TierRank::Silver => Rarity::Rare,
            TierRank::Gold => Rarity::Epic,
            TierRank::Platinum | TierRank::Diamond => Rarity::Legendary,
            TierRank::Bronze => Rarity::Common,
        }
    }

    /// Server override when present, derived value otherwise
    pub fn resolve(tier: TierRank, server: Option<Rarity>) -> Self {
        server.unwrap_or_else(|| Rarity::for_tier(tier))
    }
}

// ========================================================================
// Wire format of GET /achievements
// ========================================================================

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC)
fn deserialize_unlocked_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    parse_timestamp(raw.trim())
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid unlockedAt timestamp '{}'", raw)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierPayload {
    pub tier: TierRank,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub target: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "deserialize_unlocked_at")]
    pub unlocked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rarity: Option<Rarity>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPayload {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub current_progress: u64,
    #[serde(default)]
    pub tiers: Vec<TierPayload>,
}

pub type SnapshotPayload = HashMap<String, CategoryPayload>;

// ========================================================================
// Normalised snapshot
// ========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementTier {
    pub tier: TierRank,
    pub target: u64,
    pub progress: u64,
    pub completed: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub rarity: Rarity,
}

impl AchievementTier {
    /// Locked tier with derived rarity
    pub fn new(tier: TierRank, target: u64, progress: u64) -> Self {
        Self {
            tier,
            target,
            progress,
            completed: false,
            unlocked_at: None,
            rarity: Rarity::for_tier(tier),
        }
    }

    pub fn completed_at(mut self, unlocked_at: DateTime<Utc>) -> Self {
        self.completed = true;
        self.unlocked_at = Some(unlocked_at);
        self
    }

    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = rarity;
        self
    }

    /// Completed and stamped by the server
    pub fn is_confirmed(&self) -> bool {
        self.completed && self.unlocked_at.is_some()
    }

    /// Progress towards the target in whole percent, capped at 100
    pub fn percent(&self) -> u8 {
        if self.completed || self.target == 0 {
            return 100;
        }
        (self.progress.saturating_mul(100) / self.target).min(100) as u8
    }

    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.progress)
    }
}

impl From<TierPayload> for AchievementTier {
    fn from(payload: TierPayload) -> Self {
        Self {
            tier: payload.tier,
            target: payload.target,
            progress: payload.progress,
            completed: payload.completed,
            unlocked_at: payload.unlocked_at,
            rarity: Rarity::resolve(payload.tier, payload.rarity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCategory {
    pub current_progress: u64,
    /// Ascending by target
    tiers: Vec<AchievementTier>,
}

impl AchievementCategory {
    /// Tiers are sorted by target (rank breaks ties); a repeated rank is rejected
    pub fn new(current_progress: u64, mut tiers: Vec<AchievementTier>) -> Result<Self, ApiError> {
        tiers.sort_by_key(|t| (t.target, t.tier));

        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].iter().any(|other| other.tier == tier.tier) {
                return Err(ApiError::InvalidResponse(format!(
                    "tier '{}' listed more than once",
                    tier.tier
                )));
            }
        }

        Ok(Self {
            current_progress,
            tiers,
        })
    }

    pub fn tiers(&self) -> &[AchievementTier] {
        &self.tiers
    }

    pub fn tier(&self, rank: TierRank) -> Option<&AchievementTier> {
        self.tiers.iter().find(|t| t.tier == rank)
    }

    /// Lowest tier not completed yet
    pub fn next_tier(&self) -> Option<&AchievementTier> {
        self.tiers.iter().find(|t| !t.completed)
    }

    pub fn highest_completed(&self) -> Option<&AchievementTier> {
        self.tiers.iter().rev().find(|t| t.completed)
    }

    pub(crate) fn tiers_mut(&mut self) -> &mut [AchievementTier] {
        &mut self.tiers
    }
}

/// Full achievement state as reported by the server, keyed by category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AchievementSnapshot {
    categories: BTreeMap<String, AchievementCategory>,
}

impl AchievementSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, key: impl Into<String>, category: AchievementCategory) -> Self {
        self.categories.insert(key.into(), category);
        self
    }

    pub fn category(&self, key: &str) -> Option<&AchievementCategory> {
        self.categories.get(key)
    }

    pub fn tier(&self, key: &str, rank: TierRank) -> Option<&AchievementTier> {
        self.category(key).and_then(|c| c.tier(rank))
    }

    /// Categories in key order
    pub fn categories(&self) -> impl Iterator<Item = (&str, &AchievementCategory)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub(crate) fn category_mut(&mut self, key: &str) -> Option<&mut AchievementCategory> {
        self.categories.get_mut(key)
    }
}

impl TryFrom<SnapshotPayload> for AchievementSnapshot {
    type Error = ApiError;

    fn try_from(payload: SnapshotPayload) -> Result<Self, Self::Error> {
        let mut categories = BTreeMap::new();

        for (key, category) in payload {
            let tiers = category.tiers.into_iter().map(AchievementTier::from).collect();
            let normalised = AchievementCategory::new(category.current_progress, tiers)
                .map_err(|e| ApiError::InvalidResponse(format!("category '{}': {}", key, e)))?;
            categories.insert(key, normalised);
        }

        Ok(Self { categories })
    }
}

/// One tier crossing, surfaced exactly once per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierUnlockEvent {
    pub category: String,
    pub tier: TierRank,
    pub target: u64,
    pub rarity: Rarity,
    pub unlocked_at: DateTime<Utc>,
}
