use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::api::AchievementApi;
use super::category::CategoryTable;
use super::model::{AchievementSnapshot, TierRank, TierUnlockEvent};
use crate::global::error::ApiError;

/// Lifecycle of one (category, tier) pair within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    Locked,
    InProgress,
    CompletedUnnotified,
    /// Terminal for the session
    CompletedNotified,
}

#[derive(Debug, Default)]
struct TrackerState {
    previous: Option<AchievementSnapshot>,
    notified: HashSet<(String, TierRank)>,
    /// Generation of the newest snapshot diffed so far
    diffed_generation: u64,
}

/// Holds the last achievement snapshot and turns tier completions into
/// one-shot unlock events.
///
/// The first snapshot of a session only establishes the baseline: tiers that
/// are already complete are marked notified without an event.
pub struct AchievementTracker {
    api: Arc<dyn AchievementApi>,
    categories: CategoryTable,
    state: Mutex<TrackerState>,
    generation: AtomicU64,
}

impl std::fmt::Debug for AchievementTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AchievementTracker")
            .field("categories", &self.categories)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish()
    }
}

impl AchievementTracker {
    pub fn new(api: Arc<dyn AchievementApi>, categories: CategoryTable) -> Self {
        Self {
            api,
            categories,
            state: Mutex::new(TrackerState::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn categories(&self) -> &CategoryTable {
        &self.categories
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Fetch the latest snapshot. Tracked state is not touched.
    pub async fn refresh(&self) -> Result<AchievementSnapshot, ApiError> {
        self.api.fetch_snapshot().await.map_err(|e| {
            warn!(error = %e, "Failed to refresh achievements, keeping previous snapshot");
            e
        })
    }

    /// Ask the server to recompute achievements, for one category or all
    pub async fn trigger_check(&self, category: Option<&str>) -> Result<(), ApiError> {
        debug!(category = ?category, "Triggering server-side achievement check");
        self.api.trigger_check(category).await
    }

    /// Compare `snapshot` with the retained one and return the fresh unlocks.
    ///
    /// Events come in category table order (unknown categories last, by key),
    /// then by ascending target. The snapshot then becomes the retained one.
    pub fn diff(&self, snapshot: AchievementSnapshot) -> Vec<TierUnlockEvent> {
        let generation = self.next_generation();
        self.diff_at(generation, snapshot)
    }

    /// `refresh` then `diff`. A response that arrives after a newer snapshot
    /// was already diffed is dropped without events.
    pub async fn check_and_notify(&self) -> Result<Vec<TierUnlockEvent>, ApiError> {
        let generation = self.next_generation();
        let snapshot = self.refresh().await?;
        Ok(self.diff_at(generation, snapshot))
    }

    fn diff_at(&self, generation: u64, mut snapshot: AchievementSnapshot) -> Vec<TierUnlockEvent> {
        let mut state = self.lock();

        if generation < state.diffed_generation {
            debug!(
                generation = generation,
                diffed = state.diffed_generation,
                "Dropping achievement snapshot older than the retained one"
            );
            return Vec::new();
        }
        state.diffed_generation = generation;

        let events = match state.previous.take() {
            None => {
                let baseline = mark_baseline(&snapshot, &mut state.notified);
                info!(
                    categories = snapshot.len(),
                    already_completed = baseline,
                    "Achievement baseline established"
                );
                Vec::new()
            }
            Some(previous) => {
                carry_forward(&previous, &mut snapshot);
                let events = fresh_unlocks(&self.categories, &previous, &snapshot, &state.notified);
                for event in &events {
                    state.notified.insert((event.category.clone(), event.tier));
                    info!(
                        category = %event.category,
                        tier = %event.tier,
                        rarity = ?event.rarity,
                        target = event.target,
                        "Achievement tier unlocked"
                    );
                }
                events
            }
        };

        state.previous = Some(snapshot);
        events
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The retained snapshot, if any was diffed yet
    pub fn current(&self) -> Option<AchievementSnapshot> {
        self.lock().previous.clone()
    }

    pub fn tier_state(&self, category: &str, rank: TierRank) -> Option<TierState> {
        let state = self.lock();
        let tier = state.previous.as_ref()?.tier(category, rank)?;

        Some(if tier.completed {
            if state.notified.contains(&(category.to_string(), rank)) {
                TierState::CompletedNotified
            } else {
                TierState::CompletedUnnotified
            }
        } else if tier.progress > 0 {
            TierState::InProgress
        } else {
            TierState::Locked
        })
    }

    pub fn is_notified(&self, category: &str, rank: TierRank) -> bool {
        self.lock().notified.contains(&(category.to_string(), rank))
    }

    pub fn notified_count(&self) -> usize {
        self.lock().notified.len()
    }

    /// Forget everything, e.g. on sign-out; the next snapshot is a baseline again
    pub fn reset(&self) {
        let mut state = self.lock();
        state.previous = None;
        state.notified.clear();
        // checks issued before the reset must not land in the new session
        state.diffed_generation = self.next_generation();
        debug!("Achievement tracker reset");
    }
}

/// Mark every completed tier as notified; returns how many were marked
fn mark_baseline(snapshot: &AchievementSnapshot, notified: &mut HashSet<(String, TierRank)>) -> usize {
    let mut marked = 0;
    for (key, category) in snapshot.categories() {
        for tier in category.tiers().iter().filter(|t| t.completed) {
            if notified.insert((key.to_string(), tier.tier)) {
                marked += 1;
            }
        }
    }
    marked
}

/// Keep completions monotonic: a tier completed before stays completed with
/// its first `unlocked_at`, whatever a later snapshot claims.
fn carry_forward(previous: &AchievementSnapshot, snapshot: &mut AchievementSnapshot) {
    for (key, old_category) in previous.categories() {
        let Some(category) = snapshot.category_mut(key) else {
            continue;
        };

        if category.current_progress < old_category.current_progress {
            warn!(
                category = %key,
                previous = old_category.current_progress,
                current = category.current_progress,
                "Category progress went backwards"
            );
        }

        for tier in category.tiers_mut() {
            let Some(old) = old_category.tier(tier.tier) else {
                continue;
            };
            if !old.completed {
                continue;
            }

            if !tier.completed {
                warn!(category = %key, tier = %tier.tier, "Completed tier reported as incomplete, keeping completion");
                tier.completed = true;
            }
            if old.unlocked_at.is_some() {
                tier.unlocked_at = old.unlocked_at;
            }
        }
    }
}

fn fresh_unlocks(
    table: &CategoryTable,
    previous: &AchievementSnapshot,
    snapshot: &AchievementSnapshot,
    notified: &HashSet<(String, TierRank)>,
) -> Vec<TierUnlockEvent> {
    let mut keys: Vec<&str> = snapshot.categories().map(|(key, _)| key).collect();
    // stable: categories missing from the table keep key order at the end
    keys.sort_by_key(|key| table.position(key).unwrap_or(usize::MAX));

    let mut events = Vec::new();
    for key in keys {
        let Some(category) = snapshot.category(key) else {
            continue;
        };

        for tier in category.tiers() {
            let Some(unlocked_at) = tier.unlocked_at.filter(|_| tier.completed) else {
                continue;
            };

            let was_confirmed = previous
                .tier(key, tier.tier)
                .is_some_and(|old| old.is_confirmed());
            if was_confirmed || notified.contains(&(key.to_string(), tier.tier)) {
                continue;
            }

            events.push(TierUnlockEvent {
                category: key.to_string(),
                tier: tier.tier,
                target: tier.target,
                rarity: tier.rarity,
                unlocked_at,
            });
        }
    }
    events
}
