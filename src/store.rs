/// Size-bounded per-tab state store over a persistence backend
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::clock::Clock;
use crate::config::{StoreConfig, TAB_STATES_KEY};
use crate::error::StorageError;
use crate::storage::{StorageBackend, StoreData};
use crate::tab_state::{TabState, TabStatePatch};
use crate::video_id::{canonicalize_url, is_same_video};

/// Per-tab state, persisted as a single record.
///
/// Every operation is load, merge, persist. Reads never fail: a missing entry is a fresh
/// empty state, and an unreadable backend falls back to the last snapshot this store saw.
/// Writes retry with backoff and then degrade to the in-memory snapshot. Other contexts
/// (the service worker, another popup) share the backend, so an unsaved snapshot is
/// merged into the stored record entry by entry rather than written over it.
pub struct TabStateStore<B, C> {
    backend: B,
    clock: C,
    config: StoreConfig,
    snapshot: RefCell<StoreData>,
    // Set while the backend is behind the snapshot
    unsaved: Cell<bool>,
    // Local removals not yet written: tab id -> removal time
    tombstones: RefCell<HashMap<i32, f64>>,
    cleared_at: Cell<Option<f64>>,
}

impl<B: StorageBackend, C: Clock> TabStateStore<B, C> {
    pub fn new(backend: B, clock: C, config: StoreConfig) -> Self {
        TabStateStore {
            backend,
            clock,
            config,
            snapshot: RefCell::new(StoreData::new()),
            unsaved: Cell::new(false),
            tombstones: RefCell::new(HashMap::new()),
            cleared_at: Cell::new(None),
        }
    }

    /// The persistence backend, for records kept next to the tab states
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn get(&self, tab_id: i32) -> TabState {
        let data = self.load().await;
        data.get(tab_id)
            .cloned()
            .unwrap_or_else(|| TabState::empty(tab_id, self.clock.now_ms()))
    }

    /// Record that `tab_id` shows `url`.
    ///
    /// Same video (by id): url and title are refreshed, everything else is kept.
    /// Different video: the entry is reset, dropping the previous transcript and
    /// everything derived from it.
    pub async fn initialize(&self, tab_id: i32, url: &str, title: &str) -> TabState {
        let canonical = canonicalize_url(url);
        let mut data = self.load().await;

        let state = match data.get(tab_id) {
            Some(previous) if previous.url.is_empty() || is_same_video(&previous.url, &canonical) => {
                let mut state = previous.clone();
                state.apply(TabStatePatch::metadata(canonical, title.to_string()));
                state.last_updated = self.next_timestamp(Some(previous.last_updated));
                state
            }
            Some(previous) => {
                log::info!(
                    "Tab {} moved from {} to {}, resetting state",
                    tab_id, previous.url, canonical
                );
                let now = self.next_timestamp(Some(previous.last_updated));
                TabState::new(tab_id, canonical, title.to_string(), now)
            }
            None => TabState::new(tab_id, canonical, title.to_string(), self.next_timestamp(None)),
        };

        data.insert(state.clone());
        self.persist(data).await;
        state
    }

    /// Shallow-merge `patch` into the tab's state and bump `last_updated`
    pub async fn update(&self, tab_id: i32, patch: TabStatePatch) -> TabState {
        let mut data = self.load().await;
        let previous = data.get(tab_id).map(|s| s.last_updated);

        let mut state = data
            .get(tab_id)
            .cloned()
            .unwrap_or_else(|| TabState::empty(tab_id, self.clock.now_ms()));
        let was_processing = state.is_processing;
        state.apply(patch);
        state.last_updated = self.next_timestamp(previous);
        if state.is_processing && !was_processing {
            state.processing_since = Some(state.last_updated);
        }

        data.insert(state.clone());
        self.persist(data).await;
        state
    }

    pub async fn remove(&self, tab_id: i32) {
        let mut data = self.load().await;
        let removed_at = data
            .get(tab_id)
            .map(|s| s.last_updated.max(self.clock.now_ms()));
        if let Some(removed_at) = removed_at {
            data.remove(tab_id);
            self.tombstones.borrow_mut().insert(tab_id, removed_at);
            self.persist(data).await;
        }
    }

    pub async fn clear(&self) {
        let data = self.load().await;
        let newest = data.tabs.values().map(|s| s.last_updated).fold(self.clock.now_ms(), f64::max);
        self.cleared_at.set(Some(newest));
        self.tombstones.borrow_mut().clear();
        self.persist(StoreData::new()).await;
    }

    pub async fn set_processing(&self, tab_id: i32, is_processing: bool, step: Option<&str>) -> TabState {
        let patch = TabStatePatch {
            is_processing: Some(is_processing),
            processing_step: Some(step.map(str::to_string)),
            ..Default::default()
        };
        self.update(tab_id, patch).await
    }

    pub async fn set_error(&self, tab_id: i32, message: &str) -> TabState {
        let patch = TabStatePatch {
            error: Some(Some(message.to_string())),
            ..Default::default()
        };
        self.update(tab_id, patch).await
    }

    /// Evict oldest-updated entries until the record fits the byte budget
    pub async fn enforce_capacity(&self) -> Vec<i32> {
        let mut data = self.load().await;
        let evicted = self.evict_over_budget(&mut data);
        if !evicted.is_empty() {
            self.persist(data).await;
        }
        evicted
    }

    /// Drop closed tabs past the stale window and any tab past the max age
    pub async fn cleanup_stale(&self, open_tab_ids: &HashSet<i32>) -> Vec<i32> {
        let mut data = self.load().await;
        let removed = data.cleanup_stale(
            open_tab_ids,
            self.clock.now_ms(),
            self.config.stale_after_ms,
            self.config.max_age_ms,
        );

        if !removed.is_empty() {
            log::info!("Removed {} stale tab entries: {:?}", removed.len(), removed);
            self.persist(data).await;
        }
        removed
    }

    /// Ids currently stored, ascending
    pub async fn tab_ids(&self) -> Vec<i32> {
        self.load().await.tabs.keys().copied().collect()
    }

    fn next_timestamp(&self, previous: Option<f64>) -> f64 {
        let now = self.clock.now_ms();
        match previous {
            Some(previous) if now <= previous => previous + 1.0,
            _ => now,
        }
    }

    async fn load(&self) -> StoreData {
        let stored = match self.backend.get(TAB_STATES_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<StoreData>(value) {
                Ok(data) => Some(data),
                Err(e) => {
                    log::warn!("Unreadable tab state record, using snapshot: {}", e);
                    None
                }
            },
            Ok(None) => Some(StoreData::new()),
            Err(e) => {
                log::warn!("Failed to read tab states, using snapshot: {}", e);
                None
            }
        };

        let mut data = match stored {
            Some(stored) if self.unsaved.get() => self.merge_unsaved(stored),
            Some(stored) => stored,
            None => self.snapshot.borrow().clone(),
        };
        self.release_expired_processing(&mut data);
        *self.snapshot.borrow_mut() = data.clone();
        data
    }

    /// Combine the stored record with local changes that never reached it.
    ///
    /// Per tab, the newer `last_updated` wins. Local removals drop stored entries that
    /// are not newer than the removal.
    fn merge_unsaved(&self, mut stored: StoreData) -> StoreData {
        if let Some(cleared_at) = self.cleared_at.get() {
            stored.tabs.retain(|_, s| s.last_updated > cleared_at);
        }
        for (tab_id, removed_at) in self.tombstones.borrow().iter() {
            if stored.get(*tab_id).is_some_and(|s| s.last_updated <= *removed_at) {
                stored.remove(*tab_id);
            }
        }

        stored.merge_newer(self.snapshot.borrow().clone());
        stored
    }

    fn release_expired_processing(&self, data: &mut StoreData) {
        let now = self.clock.now_ms();
        for state in data.tabs.values_mut() {
            if state.release_expired_processing(now, self.config.processing_lease_ms) {
                log::warn!("Tab {}: processing never finished, releasing the flag", state.tab_id);
            }
        }
    }

    /// Enforce capacity, then write with bounded retries.
    ///
    /// The snapshot always holds the latest intended state, even when every write fails.
    async fn persist(&self, mut data: StoreData) {
        self.evict_over_budget(&mut data);
        *self.snapshot.borrow_mut() = data.clone();

        let attempts = self.config.persist_attempts.max(1);
        for attempt in 0..attempts {
            let value = match serde_json::to_value(&data) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Failed to serialize tab states: {}", e);
                    return;
                }
            };

            match self.backend.set(TAB_STATES_KEY, value).await {
                Ok(()) => {
                    self.unsaved.set(false);
                    self.tombstones.borrow_mut().clear();
                    self.cleared_at.set(None);
                    return;
                }
                Err(StorageError::QuotaExceeded(msg)) => {
                    log::warn!("Storage quota exceeded ({}), evicting oldest entry", msg);
                    self.evict_oldest(&mut data);
                    *self.snapshot.borrow_mut() = data.clone();
                }
                Err(e) => {
                    log::warn!("Write attempt {}/{} failed: {}", attempt + 1, attempts, e);
                }
            }

            if attempt + 1 < attempts {
                let delay = self.config.persist_backoff_ms.saturating_mul(1 << attempt.min(16));
                self.clock.sleep(delay).await;
            }
        }

        log::warn!("Giving up on persisting tab states after {} attempts, keeping in-memory copy", attempts);
        self.unsaved.set(true);
    }

    fn evict_over_budget(&self, data: &mut StoreData) -> Vec<i32> {
        match data.enforce_capacity(self.config.capacity_bytes) {
            Ok(evicted) => {
                if !evicted.is_empty() {
                    log::info!(
                        "Store over {} bytes, evicted tabs {:?}",
                        self.config.capacity_bytes, evicted
                    );
                }
                evicted
            }
            Err(e) => {
                log::warn!("Could not measure tab state record: {}", e);
                Vec::new()
            }
        }
    }

    fn evict_oldest(&self, data: &mut StoreData) {
        let oldest = data
            .tabs
            .values()
            .min_by(|a, b| a.last_updated.total_cmp(&b.last_updated))
            .map(|s| s.tab_id);
        if let Some(tab_id) = oldest {
            data.remove(tab_id);
        }
    }
}
