use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use super::model::TierUnlockEvent;
use super::tracker::AchievementTracker;
use crate::global::error::ApiError;
use crate::global::limiter::RateLimiter;

pub type UnlockListener = Arc<dyn Fn(&TierUnlockEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran; these unlocks were dispatched
    Checked(Vec<TierUnlockEvent>),
    /// Another call was already waiting for the next slot and covers this one
    Coalesced,
}

/// Categories a waiting check has to cover
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckScope {
    All,
    Category(String),
}

impl CheckScope {
    fn new(category: Option<&str>) -> Self {
        match category {
            Some(category) => CheckScope::Category(category.to_string()),
            None => CheckScope::All,
        }
    }

    /// Fold in a coalesced call; different categories widen to all
    fn widen(&mut self, category: Option<&str>) {
        if let CheckScope::Category(current) = self {
            if category != Some(current.as_str()) {
                *self = CheckScope::All;
            }
        }
    }

    fn category(&self) -> Option<&str> {
        match self {
            CheckScope::All => None,
            CheckScope::Category(category) => Some(category.as_str()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the waiting scope, also when the waiting call is abandoned
struct WaitingGuard<'a>(&'a Mutex<Option<CheckScope>>);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        lock(self.0).take();
    }
}

/// Entry point for code that changes watch progress.
///
/// Callers invoke [`progress_changed`](Self::progress_changed) after marking
/// an episode watched or finishing a title; the notifier re-checks
/// achievements at most once per interval and hands unlocks to subscribers.
pub struct ProgressNotifier {
    tracker: Arc<AchievementTracker>,
    listeners: RwLock<Vec<(ListenerId, UnlockListener)>>,
    next_listener: AtomicU64,
    limiter: RateLimiter,
    /// Scope of the check waiting for its slot, if any
    waiting: Mutex<Option<CheckScope>>,
    trigger_server_check: bool,
}

impl std::fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("limiter", &self.limiter)
            .field("trigger_server_check", &self.trigger_server_check)
            .finish()
    }
}

impl ProgressNotifier {
    pub fn new(tracker: Arc<AchievementTracker>, min_interval: Duration) -> Self {
        Self {
            tracker,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            limiter: RateLimiter::with_interval("achievement_check", min_interval),
            waiting: Mutex::new(None),
            trigger_server_check: false,
        }
    }

    /// Ask the server to recompute before each snapshot fetch
    pub fn with_server_check(mut self, enabled: bool) -> Self {
        self.trigger_server_check = enabled;
        self
    }

    pub fn tracker(&self) -> &Arc<AchievementTracker> {
        &self.tracker
    }

    pub fn subscribe(&self, listener: impl Fn(&TierUnlockEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Re-check achievements after a progress change in `category` (or
    /// anywhere when `None`).
    ///
    /// A call made while another one waits for its slot is folded into the
    /// waiting check, whose server-side scope widens to cover it.
    pub async fn progress_changed(&self, category: Option<&str>) -> Result<CheckOutcome, ApiError> {
        {
            let mut waiting = lock(&self.waiting);
            if let Some(scope) = waiting.as_mut() {
                scope.widen(category);
                debug!(category = ?category, scope = ?scope, "Achievement check already pending, coalescing");
                return Ok(CheckOutcome::Coalesced);
            }
            *waiting = Some(CheckScope::new(category));
        }

        let scope = {
            let _waiting = WaitingGuard(&self.waiting);
            self.limiter.acquire().await;
            let merged = lock(&self.waiting).take();
            merged.unwrap_or_else(|| CheckScope::new(category))
        };

        if self.trigger_server_check {
            if let Err(e) = self.tracker.trigger_check(scope.category()).await {
                warn!(scope = ?scope, error = %e, "Server-side achievement check failed");
            }
        }

        let events = self.tracker.check_and_notify().await?;
        self.dispatch(&events);
        Ok(CheckOutcome::Checked(events))
    }

    fn dispatch(&self, events: &[TierUnlockEvent]) {
        if events.is_empty() {
            return;
        }

        let listeners: Vec<UnlockListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::achievement::api::AchievementApi;
    use crate::achievement::category::CategoryTable;
    use crate::achievement::model::{AchievementCategory, AchievementSnapshot, AchievementTier, TierRank};
    use crate::achievement::queue::UnlockQueue;

    #[derive(Default)]
    struct FakeApi {
        snapshots: Mutex<VecDeque<AchievementSnapshot>>,
        fetches: AtomicU64,
        checks: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl AchievementApi for FakeApi {
        async fn fetch_snapshot(&self) -> Result<AchievementSnapshot, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut snapshots = self.snapshots.lock().unwrap();
            // the last snapshot keeps being served
            if snapshots.len() > 1 {
                Ok(snapshots.pop_front().unwrap())
            } else {
                snapshots
                    .front()
                    .cloned()
                    .ok_or_else(|| ApiError::Network("no snapshot".into()))
            }
        }

        async fn trigger_check(&self, category: Option<&str>) -> Result<(), ApiError> {
            self.checks.lock().unwrap().push(category.map(str::to_string));
            Ok(())
        }
    }

    fn movies(watched: u64) -> AchievementSnapshot {
        let unlocked = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let tier = |rank, target| {
            let tier = AchievementTier::new(rank, target, watched);
            if watched >= target { tier.completed_at(unlocked) } else { tier }
        };
        AchievementSnapshot::new().with_category(
            "movies",
            AchievementCategory::new(watched, vec![tier(TierRank::Bronze, 5), tier(TierRank::Silver, 25)])
                .unwrap(),
        )
    }

    fn notifier(api: Arc<FakeApi>, interval: Duration) -> ProgressNotifier {
        let tracker = AchievementTracker::new(api, CategoryTable::default());
        ProgressNotifier::new(Arc::new(tracker), interval)
    }

    #[tokio::test]
    async fn unlocks_reach_every_listener_in_order() {
        let api = Arc::new(FakeApi::default());
        api.snapshots.lock().unwrap().extend([movies(3), movies(30)]);
        let notifier = notifier(api.clone(), Duration::from_millis(1));

        let queue = Arc::new(Mutex::new(UnlockQueue::new()));
        notifier.subscribe({
            let queue = queue.clone();
            move |event| queue.lock().unwrap().push(event.clone())
        });
        let seen = Arc::new(AtomicU64::new(0));
        notifier.subscribe({
            let seen = seen.clone();
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(notifier.progress_changed(None).await.unwrap(), CheckOutcome::Checked(vec![]));
        let outcome = notifier.progress_changed(Some("movies")).await.unwrap();

        let CheckOutcome::Checked(events) = outcome else {
            panic!("check should have run");
        };
        assert_eq!(events.len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        let mut queue = queue.lock().unwrap();
        assert_eq!(queue.dismiss().map(|e| e.tier), Some(TierRank::Bronze));
        assert_eq!(queue.current().map(|e| e.tier), Some(TierRank::Silver));
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_not_called() {
        let api = Arc::new(FakeApi::default());
        api.snapshots.lock().unwrap().extend([movies(0), movies(6)]);
        let notifier = notifier(api.clone(), Duration::from_millis(1));

        let seen = Arc::new(AtomicU64::new(0));
        let id = notifier.subscribe({
            let seen = seen.clone();
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        notifier.progress_changed(None).await.unwrap();
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.progress_changed(None).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bursts_are_coalesced_while_waiting_for_the_interval() {
        let api = Arc::new(FakeApi::default());
        api.snapshots.lock().unwrap().push_back(movies(1));
        let notifier = Arc::new(notifier(api.clone(), Duration::from_millis(100)));

        notifier.progress_changed(None).await.unwrap();
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);

        let waiting = tokio::spawn({
            let notifier = notifier.clone();
            async move { notifier.progress_changed(None).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let burst = notifier.progress_changed(None).await.unwrap();
        assert_eq!(burst, CheckOutcome::Coalesced);

        assert!(matches!(waiting.await.unwrap(), Ok(CheckOutcome::Checked(_))));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_check_runs_before_fetch_when_enabled() {
        let api = Arc::new(FakeApi::default());
        api.snapshots.lock().unwrap().push_back(movies(1));
        let notifier = notifier(api.clone(), Duration::from_millis(1)).with_server_check(true);

        notifier.progress_changed(Some("movies")).await.unwrap();

        assert_eq!(*api.checks.lock().unwrap(), vec![Some("movies".to_string())]);
    }

    #[tokio::test]
    async fn coalesced_calls_widen_the_server_check() {
        let api = Arc::new(FakeApi::default());
        api.snapshots.lock().unwrap().push_back(movies(1));
        let notifier = Arc::new(
            notifier(api.clone(), Duration::from_millis(100)).with_server_check(true),
        );

        notifier.progress_changed(Some("anime")).await.unwrap();

        let waiting = tokio::spawn({
            let notifier = notifier.clone();
            async move { notifier.progress_changed(Some("anime")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let same = notifier.progress_changed(Some("anime")).await.unwrap();
        let other = notifier.progress_changed(Some("movies")).await.unwrap();

        assert_eq!(same, CheckOutcome::Coalesced);
        assert_eq!(other, CheckOutcome::Coalesced);
        assert!(matches!(waiting.await.unwrap(), Ok(CheckOutcome::Checked(_))));
        assert_eq!(*api.checks.lock().unwrap(), vec![Some("anime".to_string()), None]);
    }

    #[test]
    fn scope_keeps_a_repeated_category() {
        let mut scope = CheckScope::new(Some("tv"));
        scope.widen(Some("tv"));
        assert_eq!(scope.category(), Some("tv"));

        scope.widen(None);
        assert_eq!(scope, CheckScope::All);
        scope.widen(Some("tv"));
        assert_eq!(scope.category(), None);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_dispatches_nothing() {
        let api = Arc::new(FakeApi::default());
        let notifier = notifier(api.clone(), Duration::from_millis(1));
        let seen = Arc::new(AtomicU64::new(0));
        notifier.subscribe({
            let seen = seen.clone();
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let result = notifier.progress_changed(None).await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
