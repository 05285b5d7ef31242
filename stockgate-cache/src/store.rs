//! Storage contract the cache runs against. The in-memory reference lives in
//! `memory`; Redis/object-store backends implement the same trait elsewhere.
//! Backends doing real I/O must bound each call with a short timeout — the
//! cache degrades to a miss on any storage error, it never fails a request.

use crate::entry::CacheEntry;
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of a `set`: whether a new key was inserted and what, if anything,
/// was evicted to make room for it.
#[derive(Debug, Default)]
pub struct SetOutcome {
    pub inserted: bool,
    pub evicted: Option<CacheEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub approx_bytes: usize,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read an entry without mutating access stats.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace an entry. Capacity enforcement (evict-then-insert)
    /// must be atomic inside the store so its size invariant never breaks,
    /// even transiently.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<SetOutcome, CacheError>;

    /// Remove an entry; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Bump access stats after a hit.
    async fn touch(&self, key: &str, now: DateTime<Utc>) -> Result<(), CacheError>;

    /// Snapshot of all entries, used by the background sweep.
    async fn scan(&self) -> Result<Vec<CacheEntry>, CacheError>;

    async fn stats(&self) -> Result<StoreStats, CacheError>;
}

pub type SharedStore = Arc<dyn CacheStore>;
