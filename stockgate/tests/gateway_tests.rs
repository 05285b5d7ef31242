use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stockgate::async_trait::async_trait;
use stockgate::prelude::*;

struct StubHandler {
    status: u16,
    body: &'static [u8],
    etag: Option<&'static str>,
    failure: Option<fn() -> UpstreamError>,
    calls: AtomicUsize,
}

impl StubHandler {
    fn ok(status: u16, body: &'static [u8]) -> Self {
        Self {
            status,
            body,
            etag: None,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_etag(mut self, etag: &'static str) -> Self {
        self.etag = Some(etag);
        self
    }

    fn failing(failure: fn() -> UpstreamError) -> Self {
        Self {
            status: 0,
            body: b"",
            etag: None,
            failure: Some(failure),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamHandler for StubHandler {
    async fn handle(
        &self,
        _request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        let mut response = UpstreamResponse::new(self.status, self.body.to_vec())
            .with_content_type("application/json");
        if let Some(etag) = self.etag {
            response = response.with_etag(etag);
        }
        Ok(response)
    }
}

fn service() -> GatewayService {
    GatewayService::start(GatewayConfig::default(), Arc::new(NoopSink)).unwrap()
}

#[tokio::test]
async fn miss_then_hit_short_circuits_downstream() {
    let service = service();
    let handler = StubHandler::ok(200, b"{\"photos\":[]}");
    let request = UpstreamRequest::get("/api/unsplash/search")
        .with_query("query", "sunset");

    let first = service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(first.cache_status, CacheStatus::Miss);
    assert_eq!(
        first.response.headers.get("x-cache").map(String::as_str),
        Some("MISS")
    );
    assert_eq!(handler.calls(), 1);

    let second = service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(second.response.body, b"{\"photos\":[]}");
    assert_eq!(
        second.response.headers.get("x-cache").map(String::as_str),
        Some("HIT")
    );
    assert!(second.response.headers.contains_key("cache-control"));
    assert!(second.response.headers.contains_key("x-cache-age"));
    // Downstream was not invoked again.
    assert_eq!(handler.calls(), 1);

    let stats = service.cache().stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);

    service.shutdown().await;
}

#[tokio::test]
async fn validator_match_short_circuits_without_body() {
    let service = service();
    let handler = StubHandler::ok(200, b"payload").with_etag("\"v1\"");
    let request = UpstreamRequest::get("/api/unsplash/asset");

    service.middleware().handle(&request, &handler).await.unwrap();

    let conditional = request.clone().with_header("if-none-match", "\"v1\"");
    let result = service
        .middleware()
        .handle(&conditional, &handler)
        .await
        .unwrap();
    assert!(result.not_modified);
    assert!(result.response.body.is_empty());
    assert_eq!(
        result.response.headers.get("etag").map(String::as_str),
        Some("\"v1\"")
    );
    assert_eq!(handler.calls(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn error_statuses_are_cached_with_their_own_ttl() {
    let service = service();
    let handler = StubHandler::ok(503, b"unavailable");
    let request = UpstreamRequest::get("/api/getty/search");

    service.middleware().handle(&request, &handler).await.unwrap();
    let replayed = service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(replayed.cache_status, CacheStatus::Hit);
    assert_eq!(replayed.response.status_code, 503);
    assert_eq!(handler.calls(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn post_requests_bypass_the_cache() {
    let service = service();
    let handler = StubHandler::ok(200, b"licensed");
    let mut request = UpstreamRequest::get("/api/getty/license");
    request.method = "POST".to_string();

    service.middleware().handle(&request, &handler).await.unwrap();
    let second = service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(second.cache_status, CacheStatus::Miss);
    assert_eq!(handler.calls(), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn sustained_errors_open_a_critical_incident() {
    // Scenario: 10 requests, 5 server errors, threshold 0.1, min_requests 5.
    let mut config = GatewayConfig::default();
    config.detector = DetectorConfig {
        error_rate_threshold: 0.1,
        window_size_minutes: 60,
        min_requests: 5,
        spike_multiplier: 100.0,
    };
    let (sink, mut events) = ChannelSink::channel();
    let service = GatewayService::start(config, Arc::new(sink)).unwrap();

    let ok = StubHandler::ok(200, b"ok");
    let broken = StubHandler::ok(500, b"boom");
    for i in 0..10 {
        // Distinct URLs so every request reaches the handler.
        let request = UpstreamRequest::get("/api/getty/search")
            .with_query("page", &i.to_string());
        let handler = if i % 2 == 0 { &ok } else { &broken };
        service.middleware().handle(&request, handler).await.unwrap();
    }

    // Per-request samples are below min_requests individually; feed one
    // aggregated sample the way a batch reporter would.
    let mut aggregate = ProviderMetrics::empty(
        "getty",
        stockgate::chrono::Utc::now(),
    );
    aggregate.total_requests = 10;
    aggregate.successful_requests = 5;
    aggregate.error_requests = 5;
    aggregate.error_rate = 0.5;
    service.detector().record_metrics(aggregate);

    let active = service.detector().active_incidents();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, Severity::Critical);
    assert_eq!(active[0].provider, "getty");
    assert_eq!(events.try_recv().unwrap().kind(), "created");

    service.shutdown().await;
}

#[tokio::test]
async fn transport_failures_feed_the_detector() {
    let mut config = GatewayConfig::default();
    config.detector.min_requests = 1;
    let service = GatewayService::start(config, Arc::new(NoopSink)).unwrap();

    let handler = StubHandler::failing(|| UpstreamError::Timeout);
    let request = UpstreamRequest::get("/api/pexels/search");
    let result = service.middleware().handle(&request, &handler).await;
    assert!(matches!(result, Err(UpstreamError::Timeout)));

    // A single all-timeout sample trips the timeout-spike classifier.
    let active = service.detector().active_incidents();
    assert!(active
        .iter()
        .any(|record| record.incident_type == IncidentType::TimeoutSpike));

    service.shutdown().await;
}

#[tokio::test]
async fn malformed_tenant_never_leaks_another_tenants_entry() {
    let service = service();
    let tenant = "7f8a1c9e-4b2d-4f6a-9c3e-1d2b3a4c5d6e";
    let handler = StubHandler::ok(200, b"tenant-a-data");

    // Populate the cache under a valid tenant scope.
    let request = UpstreamRequest::get("/api/unsplash/asset").with_tenant(tenant);
    service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(handler.calls(), 1);

    // A hostile tenant id must not crash key derivation, and must not be
    // served the tenant-scoped entry: it falls back to the anonymous scope.
    let hostile = UpstreamRequest::get("/api/unsplash/asset")
        .with_tenant("'; DROP TABLE entries; --");
    let result = service.middleware().handle(&hostile, &handler).await.unwrap();
    assert_eq!(result.cache_status, CacheStatus::Miss);
    assert_eq!(handler.calls(), 2);

    // Same (provider, url) under the valid tenant still hits its own entry.
    let repeat = service.middleware().handle(&request, &handler).await.unwrap();
    assert_eq!(repeat.cache_status, CacheStatus::Hit);
    assert_eq!(handler.calls(), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn unknown_provider_is_scoped_to_the_unknown_bucket() {
    let mut config = GatewayConfig::default();
    config.detector.min_requests = 1;
    let service = GatewayService::start(config, Arc::new(NoopSink)).unwrap();

    let handler = StubHandler::ok(500, b"boom");
    let request = UpstreamRequest::get("/api/totally-bogus/search");
    service.middleware().handle(&request, &handler).await.unwrap();

    let incidents = service.detector().incidents_for_provider("unknown");
    assert_eq!(incidents.len(), 1);
    assert!(service.detector().incidents_for_provider("totally-bogus").is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_sweeper() {
    let service = service();
    service.shutdown().await;
}
