//! One-per-process service object wiring cache, detector and middleware
//! together, with explicit background-task lifecycle. No ambient singletons:
//! construct it once and pass it by reference to handlers.

use crate::config::GatewayConfig;
use crate::middleware::{CacheMiddleware, RequestClassifier};
use std::sync::Arc;
use std::time::Duration;
use stockgate_cache::{
    CacheError, CacheSweeper, EdgeCache, MemoryStore, SharedClock, SystemClock,
};
use stockgate_incident::{IncidentDetector, IncidentError, IncidentSink};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Incident detector error: {0}")]
    Incident(#[from] IncidentError),
}

pub struct GatewayService {
    cache: Arc<EdgeCache>,
    detector: Arc<IncidentDetector>,
    middleware: CacheMiddleware,
    sweeper: Option<CacheSweeper>,
}

impl GatewayService {
    /// Build and start the service on the system clock with the in-memory
    /// reference store. Spawns the cache sweeper; call [`shutdown`] to stop
    /// it.
    ///
    /// [`shutdown`]: GatewayService::shutdown
    pub fn start(
        config: GatewayConfig,
        sink: Arc<dyn IncidentSink>,
    ) -> Result<Self, GatewayError> {
        Self::start_with_clock(config, sink, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        config: GatewayConfig,
        sink: Arc<dyn IncidentSink>,
        clock: SharedClock,
    ) -> Result<Self, GatewayError> {
        config.cache.validate()?;

        let store = Arc::new(MemoryStore::new(config.cache.storage.max_entries));
        let cache = Arc::new(EdgeCache::new(
            store,
            config.cache.clone(),
            Arc::clone(&clock),
        ));
        let detector =
            Arc::new(IncidentDetector::new(config.detector.clone(), sink)?);
        let classifier = RequestClassifier::new(
            config.allow.providers.clone(),
            config.allow.request_types.clone(),
        );
        let middleware = CacheMiddleware::new(
            Arc::clone(&cache),
            Arc::clone(&detector),
            classifier,
            clock,
        );
        let sweeper = CacheSweeper::start(
            Arc::clone(&cache),
            Duration::from_secs(config.cache.storage.cleanup_interval_secs),
        );

        info!(
            "Gateway service started (max_entries={}, sweep every {}s)",
            config.cache.storage.max_entries,
            config.cache.storage.cleanup_interval_secs
        );
        Ok(Self {
            cache,
            detector,
            middleware,
            sweeper: Some(sweeper),
        })
    }

    pub fn middleware(&self) -> &CacheMiddleware {
        &self.middleware
    }

    pub fn cache(&self) -> &Arc<EdgeCache> {
        &self.cache
    }

    pub fn detector(&self) -> &Arc<IncidentDetector> {
        &self.detector
    }

    /// Stop the background sweeper and release the service.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop().await;
        }
        info!("Gateway service stopped");
    }
}
