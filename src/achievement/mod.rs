//! Tiered achievements: snapshot model, unlock detection and delivery.

pub mod api;
pub mod category;
pub mod model;
pub mod notifier;
pub mod queue;
pub mod tracker;

pub use api::AchievementApi;
pub use category::{CategoryInfo, CategoryTable};
pub use model::{
    AchievementCategory, AchievementSnapshot, AchievementTier, Rarity, TierRank, TierUnlockEvent,
};
pub use notifier::{CheckOutcome, ListenerId, ProgressNotifier};
pub use queue::UnlockQueue;
pub use tracker::{AchievementTracker, TierState};
