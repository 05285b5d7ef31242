//! Status-aware response cache with stale-while-revalidate bookkeeping.
//!
//! `EdgeCache` owns TTL resolution, staleness classification, conditional
//! (ETag) matching and hit/miss/eviction accounting. It signals when a
//! background revalidation is due but never performs the fetch itself, and
//! it never emits HTTP status codes — mapping a validator match to a 304 is
//! the caller's business.

use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CachePayload, StatusClass};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::store::SharedStore;
use chrono::{DateTime, Duration, Utc};
use derive_builder::Builder;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Builder, Default, Clone, Debug)]
#[builder(public, setter(into), default)]
pub struct GetOptions {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub force_refresh: bool,
}

#[derive(Builder, Default, Clone, Debug)]
#[builder(public, setter(into), default)]
pub struct SetOptions {
    /// Requested TTL in seconds; clamped to the status class bounds.
    pub ttl: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Per-call SWR override; `None` follows the global setting.
    pub stale_while_revalidate: Option<bool>,
}

/// Outcome of one cache lookup.
#[derive(Debug, Clone, Default)]
pub struct CacheLookup {
    pub hit: bool,
    pub entry: Option<CacheEntry>,
    pub stale: bool,
    /// Set on stale hits: the caller should trigger a revalidation.
    pub background_refresh: bool,
    /// The request's validator matched the stored entry; the caller may
    /// answer with a not-modified response instead of replaying the body.
    pub validator_match: bool,
}

impl CacheLookup {
    fn miss() -> Self {
        Self::default()
    }
}

/// Read-only counters snapshot. All counters are monotonic since service
/// start; there is no reset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStatsSnapshot {
    pub entries: usize,
    pub approx_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expired_swept: u64,
}

pub struct EdgeCache {
    store: SharedStore,
    config: CacheConfig,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_swept: AtomicU64,
}

impl EdgeCache {
    pub fn new(store: SharedStore, config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            store,
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_swept: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a cached response. Storage failures degrade to a miss — a
    /// broken cache must never fail the request it fronts.
    pub async fn get(&self, key: &CacheKey, opts: &GetOptions) -> CacheLookup {
        let storage_key = key.storage_key();

        if opts.force_refresh {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::miss();
        }

        let stored = match self.store.get(&storage_key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Cache storage get failed, degrading to miss: {}", e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return CacheLookup::miss();
            }
        };

        let Some(mut entry) = stored else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::miss();
        };

        let now = self.clock.now();
        let stale = if entry.is_fresh(now) {
            false
        } else if self.config.swr.enabled && entry.is_within_stale_window(now) {
            true
        } else {
            // Fully expired; reclaim opportunistically and miss.
            if let Err(e) = self.store.delete(&storage_key).await {
                warn!("Failed to drop expired cache entry: {}", e);
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::miss();
        };

        if let Err(e) = self.store.touch(&storage_key, now).await {
            warn!("Failed to update cache access stats: {}", e);
        }
        entry.access_count += 1;
        entry.last_accessed = now;
        self.hits.fetch_add(1, Ordering::Relaxed);

        let validator_match = validator_matches(&entry, opts);
        CacheLookup {
            hit: true,
            stale,
            background_refresh: stale,
            validator_match,
            entry: Some(entry),
        }
    }

    /// Store a response. TTL is resolved from the status class; when SWR is
    /// on, the stale window is `min(ttl * multiplier, max_ttl)` past expiry.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: CachePayload,
        status_code: u16,
        opts: &SetOptions,
    ) -> Result<(), CacheError> {
        let class = StatusClass::from_status(status_code);
        let ttl_secs = self.config.ttl.bounds_for(class).clamp(opts.ttl);

        let now = self.clock.now();
        let expires_at = now + Duration::seconds(ttl_secs as i64);

        let swr_wanted =
            self.config.swr.enabled && opts.stale_while_revalidate != Some(false);
        let stale_until = swr_wanted.then(|| {
            let window = ((ttl_secs as f64 * self.config.swr.ttl_multiplier) as u64)
                .min(self.config.swr.max_ttl_secs);
            expires_at + Duration::seconds(window as i64)
        });

        let storage_key = key.storage_key();
        let entry = CacheEntry {
            key: storage_key.clone(),
            value,
            status_code,
            created_at: now,
            expires_at,
            stale_until,
            access_count: 0,
            last_accessed: now,
            provider: key.provider.clone(),
            request_type: key.request_type.clone(),
            etag: opts.etag.clone(),
            last_modified: opts.last_modified,
        };

        let outcome = self.store.set(&storage_key, entry).await?;
        if let Some(evicted) = outcome.evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Evicted cache entry for {} ({}) under capacity pressure",
                evicted.provider, evicted.key
            );
        }
        Ok(())
    }

    pub async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        self.store.delete(&key.storage_key()).await
    }

    /// Remove every entry past its effective deadline (`stale_until`, or
    /// `expires_at` when no SWR window was recorded). Called by the sweeper
    /// so memory stays bounded without relying on read traffic.
    pub async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut removed = 0usize;
        for entry in self.store.scan().await? {
            if entry.is_expired(now) && self.store.delete(&entry.key).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.expired_swept
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStatsSnapshot {
        let store_stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Cache storage stats unavailable: {}", e);
                Default::default()
            }
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStatsSnapshot {
            entries: store_stats.entries,
            approx_bytes: store_stats.approx_bytes,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_swept: self.expired_swept.load(Ordering::Relaxed),
        }
    }
}

fn validator_matches(entry: &CacheEntry, opts: &GetOptions) -> bool {
    if let (Some(if_none_match), Some(etag)) =
        (opts.if_none_match.as_deref(), entry.etag.as_deref())
    {
        if if_none_match == etag {
            return true;
        }
    }
    if let (Some(if_modified_since), Some(last_modified)) =
        (opts.if_modified_since, entry.last_modified)
    {
        if last_modified <= if_modified_since {
            return true;
        }
    }
    false
}

impl std::fmt::Debug for EdgeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeCache")
            .field("config", &self.config)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .field("evictions", &self.evictions.load(Ordering::Relaxed))
            .finish()
    }
}
