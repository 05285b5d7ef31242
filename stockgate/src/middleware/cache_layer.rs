//! The request-path orchestration: cache lookup, downstream invocation,
//! response annotation and the one-sample-per-request metrics feed.

use crate::middleware::extract::RequestClassifier;
use crate::middleware::http::{
    CacheStatus, GatewayResponse, UpstreamError, UpstreamHandler,
    UpstreamRequest, UpstreamResponse,
};
use chrono::DateTime;
use std::sync::Arc;
use std::time::Instant;
use stockgate_cache::{
    CacheEntry, CacheKey, CachePayload, EdgeCache, GetOptions, SetOptions,
    SharedClock,
};
use stockgate_incident::{IncidentDetector, ProviderMetrics, RequestOutcome};
use tracing::{debug, warn};

pub struct CacheMiddleware {
    cache: Arc<EdgeCache>,
    detector: Arc<IncidentDetector>,
    classifier: RequestClassifier,
    clock: SharedClock,
}

impl CacheMiddleware {
    pub fn new(
        cache: Arc<EdgeCache>,
        detector: Arc<IncidentDetector>,
        classifier: RequestClassifier,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache,
            detector,
            classifier,
            clock,
        }
    }

    /// Run one request through the cache. Every call — hit, miss or
    /// transport failure — feeds exactly one metrics sample to the
    /// incident detector.
    pub async fn handle(
        &self,
        request: &UpstreamRequest,
        handler: &dyn UpstreamHandler,
    ) -> Result<GatewayResponse, UpstreamError> {
        let provider = self.classifier.provider_for(request);
        let request_type = self.classifier.request_type_for(request);
        let started = Instant::now();

        if request.method.eq_ignore_ascii_case("GET") {
            let key = self.derive_key(request, &provider, &request_type);
            let opts = get_options_from(request);
            let lookup = self.cache.get(&key, &opts).await;

            if let Some(entry) = lookup.entry.as_ref().filter(|_| lookup.hit) {
                let response = self.replay(entry, lookup.stale, lookup.validator_match);
                self.report(
                    &provider,
                    &request.path,
                    RequestOutcome::Status(entry.status_code),
                    started,
                );
                return Ok(GatewayResponse {
                    response,
                    cache_status: if lookup.stale {
                        CacheStatus::HitStale
                    } else {
                        CacheStatus::Hit
                    },
                    not_modified: lookup.validator_match,
                    revalidation_due: lookup.background_refresh,
                });
            }

            let outcome = handler.handle(request).await;
            match outcome {
                Ok(response) => {
                    self.store(&key, &response).await;
                    self.report(
                        &provider,
                        &request.path,
                        RequestOutcome::Status(response.status_code),
                        started,
                    );
                    Ok(self.pass_through(response))
                }
                Err(error) => {
                    self.report(
                        &provider,
                        &request.path,
                        outcome_for_error(&error),
                        started,
                    );
                    Err(error)
                }
            }
        } else {
            // Non-GET traffic is never cached, only observed.
            let outcome = handler.handle(request).await;
            match outcome {
                Ok(response) => {
                    self.report(
                        &provider,
                        &request.path,
                        RequestOutcome::Status(response.status_code),
                        started,
                    );
                    Ok(self.pass_through(response))
                }
                Err(error) => {
                    self.report(
                        &provider,
                        &request.path,
                        outcome_for_error(&error),
                        started,
                    );
                    Err(error)
                }
            }
        }
    }

    fn derive_key(
        &self,
        request: &UpstreamRequest,
        provider: &str,
        request_type: &str,
    ) -> CacheKey {
        CacheKey::new(
            provider,
            request_type,
            &request.method,
            &request.canonical_url(),
            &request.headers,
            &request.query,
            request.tenant_id.as_deref(),
        )
    }

    /// Rebuild a response from a cached entry, annotated with cache
    /// observability headers. A validator match drops the body; the caller
    /// maps that to a 304.
    fn replay(
        &self,
        entry: &CacheEntry,
        stale: bool,
        validator_match: bool,
    ) -> UpstreamResponse {
        let now = self.clock.now();
        let mut response = UpstreamResponse {
            status_code: entry.status_code,
            body: if validator_match {
                Vec::new()
            } else {
                entry.value.body.clone()
            },
            content_type: entry.value.content_type.clone(),
            headers: entry.value.headers.clone(),
            etag: entry.etag.clone(),
            last_modified: entry.last_modified,
        };

        let status = if stale {
            CacheStatus::HitStale
        } else {
            CacheStatus::Hit
        };
        response
            .headers
            .insert("x-cache".to_string(), status.as_str().to_string());
        response.headers.insert(
            "cache-control".to_string(),
            format!("max-age={}", entry.remaining_fresh_secs(now)),
        );
        response.headers.insert(
            "x-cache-age".to_string(),
            entry.age_secs(now).to_string(),
        );
        if let Some(etag) = &entry.etag {
            response.headers.insert("etag".to_string(), etag.clone());
        }
        if let Some(last_modified) = entry.last_modified {
            response.headers.insert(
                "last-modified".to_string(),
                last_modified.to_rfc2822(),
            );
        }
        response
    }

    fn pass_through(&self, mut response: UpstreamResponse) -> GatewayResponse {
        response.headers.insert(
            "x-cache".to_string(),
            CacheStatus::Miss.as_str().to_string(),
        );
        GatewayResponse {
            response,
            cache_status: CacheStatus::Miss,
            not_modified: false,
            revalidation_due: false,
        }
    }

    /// Store any GET outcome that produced an HTTP status. Cache failures
    /// are logged and swallowed: they must never fail the request.
    async fn store(&self, key: &CacheKey, response: &UpstreamResponse) {
        let mut payload = CachePayload::new(
            response.body.clone(),
            response.content_type.clone(),
        );
        payload.headers = response.headers.clone();

        let opts = SetOptions {
            ttl: None,
            etag: response.etag.clone(),
            last_modified: response.last_modified,
            stale_while_revalidate: None,
        };
        if let Err(e) = self
            .cache
            .set(key, payload, response.status_code, &opts)
            .await
        {
            warn!("Failed to cache upstream response: {}", e);
        }
    }

    fn report(
        &self,
        provider: &str,
        endpoint: &str,
        outcome: RequestOutcome,
        started: Instant,
    ) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let sample = ProviderMetrics::single_request(
            provider,
            endpoint,
            outcome,
            latency_ms,
            self.clock.now(),
        );
        debug!(
            "Reporting metrics sample for {} ({:?})",
            provider, outcome
        );
        self.detector.record_metrics(sample);
    }
}

fn get_options_from(request: &UpstreamRequest) -> GetOptions {
    let force_refresh = request
        .header("cache-control")
        .is_some_and(|v| v.contains("no-cache"));
    let if_modified_since = request.header("if-modified-since").and_then(|v| {
        DateTime::parse_from_rfc2822(v)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    });
    GetOptions {
        if_none_match: request.header("if-none-match").map(str::to_string),
        if_modified_since,
        force_refresh,
    }
}

fn outcome_for_error(error: &UpstreamError) -> RequestOutcome {
    match error {
        UpstreamError::Timeout => RequestOutcome::Timeout,
        UpstreamError::Connection(_) => RequestOutcome::ConnectionError,
    }
}
