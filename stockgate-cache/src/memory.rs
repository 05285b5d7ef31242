//! In-memory reference implementation of the storage contract. Entries live
//! in a hash map; a deque of storage keys tracks insertion order so capacity
//! eviction is FIFO in O(1) without relying on map iteration order.

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::{CacheStore, SetOutcome, StoreStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

struct MemoryInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in first-insertion order. May contain ids already deleted; those
    /// are skipped lazily when picking an eviction victim.
    order: VecDeque<String>,
    approx_bytes: usize,
}

pub struct MemoryStore {
    max_entries: usize,
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new(MemoryInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                approx_bytes: 0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, CacheError> {
        self.inner
            .lock()
            .map_err(|e| CacheError::Storage(e.to_string()))
    }
}

impl MemoryInner {
    /// Pop insertion-order keys until one still maps to a live entry.
    fn evict_oldest(&mut self) -> Option<CacheEntry> {
        while let Some(victim_key) = self.order.pop_front() {
            if let Some(victim) = self.entries.remove(&victim_key) {
                self.approx_bytes =
                    self.approx_bytes.saturating_sub(victim.approx_size());
                return Some(victim);
            }
        }
        None
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let inner = self.lock()?;
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<SetOutcome, CacheError> {
        let mut inner = self.lock()?;
        let entry_size = entry.approx_size();

        if let Some(previous) = inner.entries.insert(key.to_string(), entry) {
            // Replacing keeps the original insertion-order slot.
            inner.approx_bytes = inner
                .approx_bytes
                .saturating_sub(previous.approx_size())
                .saturating_add(entry_size);
            return Ok(SetOutcome {
                inserted: false,
                evicted: None,
            });
        }

        let evicted = if inner.entries.len() > self.max_entries {
            // The new key is already in; drop the oldest surviving one so
            // the size invariant holds before the lock is released.
            inner.evict_oldest()
        } else {
            None
        };
        inner.order.push_back(key.to_string());
        inner.approx_bytes = inner.approx_bytes.saturating_add(entry_size);

        Ok(SetOutcome {
            inserted: true,
            evicted,
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut inner = self.lock()?;
        match inner.entries.remove(key) {
            Some(removed) => {
                inner.approx_bytes =
                    inner.approx_bytes.saturating_sub(removed.approx_size());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch(&self, key: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get_mut(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        entry.access_count += 1;
        entry.last_accessed = now;
        Ok(())
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let inner = self.lock()?;
        Ok(inner.entries.values().cloned().collect())
    }

    async fn stats(&self) -> Result<StoreStats, CacheError> {
        let inner = self.lock()?;
        Ok(StoreStats {
            entries: inner.entries.len(),
            approx_bytes: inner.approx_bytes,
        })
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.lock() {
            Ok(inner) => f
                .debug_struct("MemoryStore")
                .field("max_entries", &self.max_entries)
                .field("entries", &inner.entries.len())
                .field("approx_bytes", &inner.approx_bytes)
                .finish(),
            Err(_) => f.write_str("MemoryStore { <poisoned> }"),
        }
    }
}
