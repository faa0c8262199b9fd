/// Persistence backends and the serialized tab state record
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;
use crate::tab_state::TabState;

/// Async key-value persistence (chrome.storage.local in the browser)
#[allow(async_fn_in_trait)]
pub trait StorageBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Root record: tab id -> state
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct StoreData {
    pub tabs: BTreeMap<i32, TabState>,
}

impl StoreData {
    pub fn new() -> Self {
        StoreData {
            tabs: BTreeMap::new(),
        }
    }

    pub fn get(&self, tab_id: i32) -> Option<&TabState> {
        self.tabs.get(&tab_id)
    }

    pub fn insert(&mut self, state: TabState) {
        self.tabs.insert(state.tab_id, state);
    }

    pub fn remove(&mut self, tab_id: i32) -> bool {
        self.tabs.remove(&tab_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Take each entry of `other` that is missing here or has a newer `last_updated`
    pub fn merge_newer(&mut self, other: StoreData) {
        for (tab_id, state) in other.tabs {
            let newer = self
                .tabs
                .get(&tab_id)
                .is_none_or(|current| state.last_updated > current.last_updated);
            if newer {
                self.tabs.insert(tab_id, state);
            }
        }
    }

    pub fn serialized_size(&self) -> Result<usize, StorageError> {
        Ok(serde_json::to_vec(self)?.len())
    }

    /// Evict oldest-updated entries until the serialized record fits in `budget` bytes.
    /// Returns the evicted ids in eviction order.
    pub fn enforce_capacity(&mut self, budget: usize) -> Result<Vec<i32>, StorageError> {
        let mut evicted = Vec::new();

        while self.serialized_size()? > budget {
            let oldest = self
                .tabs
                .values()
                .min_by(|a, b| {
                    a.last_updated
                        .total_cmp(&b.last_updated)
                        .then_with(|| a.tab_id.cmp(&b.tab_id))
                })
                .map(|s| s.tab_id);

            match oldest {
                Some(tab_id) => {
                    self.tabs.remove(&tab_id);
                    evicted.push(tab_id);
                }
                None => break,
            }
        }

        Ok(evicted)
    }

    /// Drop closed tabs idle for `stale_after_ms`, and any tab idle for `max_age_ms`.
    /// Returns the removed ids in ascending order.
    pub fn cleanup_stale(
        &mut self,
        open_tab_ids: &HashSet<i32>,
        now: f64,
        stale_after_ms: f64,
        max_age_ms: f64,
    ) -> Vec<i32> {
        let removed: Vec<i32> = self
            .tabs
            .values()
            .filter(|s| {
                let idle = now - s.last_updated;
                idle > max_age_ms || (!open_tab_ids.contains(&s.tab_id) && idle > stale_after_ms)
            })
            .map(|s| s.tab_id)
            .collect();

        for tab_id in &removed {
            self.tabs.remove(tab_id);
        }

        removed
    }
}

/// In-process backend with an optional byte quota and injectable write failures
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, Value>>>,
    quota_bytes: Option<usize>,
    failing_writes: Rc<Cell<u32>>,
    write_count: Rc<Cell<u32>>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    pub fn with_quota(quota_bytes: usize) -> MemoryStorage {
        MemoryStorage {
            quota_bytes: Some(quota_bytes),
            ..MemoryStorage::default()
        }
    }

    /// Make the next `count` writes fail as if the backend were unavailable
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.set(count);
    }

    /// Successful and failed write attempts so far
    pub fn write_count(&self) -> u32 {
        self.write_count.get()
    }

    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    fn used_bytes(entries: &HashMap<String, Value>) -> usize {
        entries
            .iter()
            .map(|(k, v)| k.len() + v.to_string().len())
            .sum()
    }
}

impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.write_count.set(self.write_count.get() + 1);

        let pending = self.failing_writes.get();
        if pending > 0 {
            self.failing_writes.set(pending - 1);
            return Err(StorageError::Unavailable("injected write failure".to_string()));
        }

        let mut entries = self.entries.borrow_mut();
        if let Some(quota) = self.quota_bytes {
            let mut projected = entries.clone();
            projected.insert(key.to_string(), value.clone());
            let used = Self::used_bytes(&projected);
            if used > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "{} bytes requested, {} allowed",
                    used, quota
                )));
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
