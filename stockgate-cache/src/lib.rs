//! HTTP response cache for the stockgate gateway.
//!
//! Fronts unreliable stock-media provider APIs with a status-aware TTL
//! cache: per-status-class TTL bounds, stale-while-revalidate bookkeeping,
//! FIFO capacity eviction and a cancellable background sweep. Storage is a
//! trait with an in-memory reference implementation; other backends plug in
//! behind the same contract.

mod cache;
mod clock;
mod config;
mod entry;
mod error;
mod key;
mod memory;
mod store;
mod sweeper;

pub use cache::{
    CacheLookup, CacheStatsSnapshot, EdgeCache, GetOptions, GetOptionsBuilder,
    SetOptions, SetOptionsBuilder,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheConfig, StorageConfig, SwrConfig, TtlBounds, TtlConfig};
pub use entry::{CacheEntry, CachePayload, StatusClass};
pub use error::CacheError;
pub use key::{parse_tenant_id, CacheKey, CACHE_RELEVANT_HEADERS};
pub use memory::MemoryStore;
pub use store::{CacheStore, SetOutcome, SharedStore, StoreStats};
pub use sweeper::CacheSweeper;
