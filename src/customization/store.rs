use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::api::CustomizationApi;
use super::model::{Artwork, CustomizationEntry, MediaId, MediaType};
use crate::global::error::ApiError;

/// Local entry plus the local revision that wrote it
#[derive(Debug, Clone)]
struct Tracked {
    entry: CustomizationEntry,
    revision: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<MediaId, Tracked>,
    /// Bumped by every local write
    revision: u64,
    /// Generation of the newest bulk load applied so far
    applied_load: u64,
}

impl StoreState {
    fn write(&mut self, media_id: MediaId, entry: CustomizationEntry) {
        self.revision += 1;
        let revision = self.revision;
        self.entries.insert(media_id, Tracked { entry, revision });
    }
}

#[derive(Debug, Default)]
struct SlotState {
    /// Sequence number of the most recent save request
    requested: u64,
    /// Latest requested value not yet confirmed by a settled write
    pending: Option<(u64, MediaType, CustomizationEntry)>,
    /// Outcome of the last write that reached the server
    settled: Option<(u64, Result<CustomizationEntry, ApiError>)>,
}

/// Per media id write serialization
#[derive(Debug, Default)]
struct SaveSlot {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<SlotState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local view of per-media artwork overrides, reconciled with the server.
///
/// Reads never touch the network. Writes are applied optimistically with
/// [`apply_local`](Self::apply_local) and confirmed with [`save`](Self::save);
/// at most one write per media id is in flight at any time.
pub struct CustomizationStore {
    api: Arc<dyn CustomizationApi>,
    state: RwLock<StoreState>,
    slots: Mutex<HashMap<MediaId, Arc<SaveSlot>>>,
    load_generation: AtomicU64,
}

impl std::fmt::Debug for CustomizationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomizationStore")
            .field("entries", &self.len())
            .finish()
    }
}

impl CustomizationStore {
    pub fn new(api: Arc<dyn CustomizationApi>) -> Self {
        Self::with_entries(api, HashMap::new())
    }

    /// Start from already known entries, e.g. a cached previous session
    pub fn with_entries(
        api: Arc<dyn CustomizationApi>,
        initial: HashMap<MediaId, CustomizationEntry>,
    ) -> Self {
        let entries = initial
            .into_iter()
            .map(|(id, entry)| (id, Tracked { entry, revision: 0 }))
            .collect();

        Self {
            api,
            state: RwLock::new(StoreState {
                entries,
                ..StoreState::default()
            }),
            slots: Mutex::new(HashMap::new()),
            load_generation: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, media_id: &MediaId) -> Option<CustomizationEntry> {
        self.read().entries.get(media_id).map(|t| t.entry.clone())
    }

    /// Artwork to display, falling back to the catalog defaults per slot
    pub fn resolve(
        &self,
        media_id: &MediaId,
        default_background: Option<&str>,
        default_poster: Option<&str>,
    ) -> Artwork {
        let entry = self.get(media_id);
        Artwork::resolve(entry.as_ref(), default_background, default_poster)
    }

    pub fn snapshot(&self) -> HashMap<MediaId, CustomizationEntry> {
        self.read()
            .entries
            .iter()
            .map(|(id, t)| (id.clone(), t.entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Optimistically overwrite the local entry; never contacts the server
    pub fn apply_local(&self, media_id: MediaId, entry: CustomizationEntry) {
        debug!(media_id = %media_id, "Applying local customization");
        self.write().write(media_id, entry);
    }

    /// Replace the local contents with the server's full set.
    ///
    /// On failure the previous contents stay. Entries written locally while
    /// the request was in flight, or with a save still queued or in flight,
    /// win over the fetched ones. A response older than an already applied
    /// load is dropped.
    pub async fn load_all(&self) -> Result<HashMap<MediaId, CustomizationEntry>, ApiError> {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_at = self.read().revision;

        let fetched = self.api.fetch_all().await.map_err(|e| {
            warn!(generation = generation, error = %e, "Failed to load customizations, keeping cached entries");
            e
        })?;

        let mut state = self.write();
        if generation <= state.applied_load {
            debug!(
                generation = generation,
                applied = state.applied_load,
                "Discarding customization load superseded by a newer one"
            );
        } else {
            state.applied_load = generation;

            let mut entries: HashMap<MediaId, Tracked> = fetched
                .into_iter()
                .map(|(id, entry)| (id, Tracked { entry, revision: issued_at }))
                .collect();

            // ids with a save queued or in flight keep their optimistic value
            let saving = lock(&self.slots);
            let mut kept = 0;
            for (id, tracked) in state.entries.iter() {
                if tracked.revision > issued_at || saving.contains_key(id) {
                    entries.insert(id.clone(), tracked.clone());
                    kept += 1;
                }
            }
            drop(saving);

            state.entries = entries;
            info!(
                count = state.entries.len(),
                kept_local = kept,
                "Customizations loaded"
            );
        }

        Ok(state
            .entries
            .iter()
            .map(|(id, t)| (id.clone(), t.entry.clone()))
            .collect())
    }

    /// Fetch one entry and store it locally.
    ///
    /// The fetched value is not applied while a save for the same media id is
    /// queued or in flight.
    pub async fn fetch(
        &self,
        media_id: &MediaId,
        media_type: MediaType,
    ) -> Result<CustomizationEntry, ApiError> {
        let entry = self.api.fetch_one(media_id, media_type).await?;

        if lock(&self.slots).contains_key(media_id) {
            debug!(media_id = %media_id, "Save in progress, not applying fetched customization");
        } else {
            self.write().write(media_id.clone(), entry.clone());
        }

        Ok(entry)
    }

    /// Persist an entry and adopt the server's canonical value.
    ///
    /// Saves for one media id are serialized. A call that queued behind an
    /// in-flight write sends the most recently requested entry once it gets
    /// its turn; callers whose entry was superseded that way receive the
    /// outcome of the write that carried the newer entry. On failure the
    /// optimistic local value is left in place.
    pub async fn save(
        &self,
        media_id: MediaId,
        media_type: MediaType,
        entry: CustomizationEntry,
    ) -> Result<CustomizationEntry, ApiError> {
        entry.validate()?;

        let lease = self.lease(&media_id);
        self.save_in_slot(&lease.slot, &media_id, media_type, entry).await
    }

    async fn save_in_slot(
        &self,
        slot: &Arc<SaveSlot>,
        media_id: &MediaId,
        media_type: MediaType,
        entry: CustomizationEntry,
    ) -> Result<CustomizationEntry, ApiError> {
        let seq = {
            let mut state = lock(&slot.state);
            state.requested += 1;
            state.pending = Some((state.requested, media_type, entry.clone()));
            state.requested
        };

        let _turn = slot.gate.lock().await;

        let (write_seq, write_type, write_entry) = {
            let state = lock(&slot.state);
            if let Some((settled_seq, outcome)) = &state.settled {
                if *settled_seq >= seq {
                    debug!(
                        media_id = %media_id,
                        seq = seq,
                        settled_seq = *settled_seq,
                        "Save coalesced into a newer write"
                    );
                    return outcome.clone();
                }
            }
            state
                .pending
                .clone()
                .unwrap_or((seq, media_type, entry))
        };

        debug!(media_id = %media_id, seq = write_seq, "Saving customization");
        let result = self.api.save(media_id, write_type, &write_entry).await;

        let superseded = {
            let mut state = lock(&slot.state);
            state.settled = Some((write_seq, result.clone()));
            // the map and this call's lease; any further holder is a queued save
            let queued = Arc::strong_count(slot) > 2;
            if !queued || state.pending.as_ref().is_some_and(|(p, _, _)| *p <= write_seq) {
                state.pending = None;
            }
            queued && state.requested > write_seq
        };

        match &result {
            Ok(canonical) if !superseded => {
                self.write().write(media_id.clone(), canonical.clone());
                info!(media_id = %media_id, "Customization saved");
            }
            Ok(_) => {
                debug!(media_id = %media_id, "Newer save queued, keeping optimistic value");
            }
            Err(e) => {
                warn!(media_id = %media_id, error = %e, "Failed to save customization, optimistic value kept");
            }
        }

        result
    }

    fn lease(&self, media_id: &MediaId) -> SlotLease<'_> {
        let slot = lock(&self.slots)
            .entry(media_id.clone())
            .or_default()
            .clone();

        SlotLease {
            store: self,
            media_id: media_id.clone(),
            slot,
        }
    }
}

/// Holds a save slot for the duration of one `save` call, including one
/// abandoned mid-flight, and forgets the slot when the last holder leaves.
struct SlotLease<'a> {
    store: &'a CustomizationStore,
    media_id: MediaId,
    slot: Arc<SaveSlot>,
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        let mut slots = lock(&self.store.slots);
        // the map and this lease
        if Arc::strong_count(&self.slot) <= 2 {
            slots.remove(&self.media_id);
        }
    }
}
