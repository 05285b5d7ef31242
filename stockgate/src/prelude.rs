//! Convenience re-exports for embedding services.

pub use crate::config::{AllowListConfig, ConfigError, GatewayConfig};
pub use crate::middleware::{
    CacheMiddleware, CacheStatus, GatewayResponse, RequestClassifier,
    UpstreamError, UpstreamHandler, UpstreamRequest, UpstreamResponse,
};
pub use crate::service::{GatewayError, GatewayService};
pub use stockgate_cache::{
    CacheConfig, CacheEntry, CacheKey, CacheLookup, CachePayload, CacheStore,
    CacheSweeper, Clock, EdgeCache, GetOptions, ManualClock, MemoryStore,
    SetOptions, SharedClock, StatusClass, SystemClock,
};
pub use stockgate_incident::{
    ChannelSink, DetectorConfig, IncidentDetector, IncidentEvent,
    IncidentRecord, IncidentSink, IncidentSummary, IncidentType, NoopSink,
    ProviderMetrics, RequestOutcome, Severity,
};
