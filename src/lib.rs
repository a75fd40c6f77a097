//! Client-side customization and achievement tracking for the Movieo media
//! tracker.
//!
//! [`customization::CustomizationStore`] keeps per-media artwork overrides with
//! optimistic writes reconciled against the server.
//! [`achievement::AchievementTracker`] diffs achievement snapshots and surfaces
//! every tier unlock exactly once per session.

pub mod achievement;
pub mod customization;
pub mod global;

pub use achievement::{AchievementTracker, ProgressNotifier, TierUnlockEvent, UnlockQueue};
pub use customization::{CustomizationEntry, CustomizationStore, MediaId, MediaType};
pub use global::error::{ApiError, AppError, ConfigError};
pub use global::http::MovieoClient;
