//! Per-provider metric samples. The middleware produces one sample per
//! inbound request; the detector keeps them in arrival order and trims to
//! the detection window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a single upstream call ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// An HTTP response came back with this status.
    Status(u16),
    Timeout,
    ConnectionError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub requests: u64,
    pub errors: u64,
}

/// One windowed aggregate sample for a provider. Partial or zero-valued
/// samples are legal; every ratio treats 0/0 as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub provider: String,
    pub recorded_at: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Hard failures: 5xx responses, timeouts and connection errors.
    pub error_requests: u64,
    pub rate_limited_requests: u64,
    pub timeout_requests: u64,
    pub connection_errors: u64,
    /// `error_requests / total_requests`.
    pub error_rate: f64,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub status_codes: HashMap<u16, u64>,
    pub endpoints: HashMap<String, EndpointStats>,
}

impl ProviderMetrics {
    pub fn empty(provider: &str, recorded_at: DateTime<Utc>) -> Self {
        Self {
            provider: provider.to_string(),
            recorded_at,
            total_requests: 0,
            successful_requests: 0,
            error_requests: 0,
            rate_limited_requests: 0,
            timeout_requests: 0,
            connection_errors: 0,
            error_rate: 0.0,
            average_response_time_ms: 0.0,
            p95_response_time_ms: 0.0,
            status_codes: HashMap::new(),
            endpoints: HashMap::new(),
        }
    }

    /// Sample describing exactly one request. With a single observation the
    /// average and p95 latency coincide.
    pub fn single_request(
        provider: &str,
        endpoint: &str,
        outcome: RequestOutcome,
        latency_ms: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let mut sample = Self::empty(provider, recorded_at);
        sample.total_requests = 1;
        sample.average_response_time_ms = latency_ms;
        sample.p95_response_time_ms = latency_ms;

        let mut is_error = false;
        match outcome {
            RequestOutcome::Status(status) => {
                *sample.status_codes.entry(status).or_insert(0) += 1;
                match status {
                    200..=299 => sample.successful_requests = 1,
                    429 => sample.rate_limited_requests = 1,
                    500..=599 => {
                        sample.error_requests = 1;
                        is_error = true;
                    }
                    _ => {}
                }
            }
            RequestOutcome::Timeout => {
                sample.timeout_requests = 1;
                sample.error_requests = 1;
                is_error = true;
            }
            RequestOutcome::ConnectionError => {
                sample.connection_errors = 1;
                sample.error_requests = 1;
                is_error = true;
            }
        }
        sample.error_rate = if is_error { 1.0 } else { 0.0 };
        sample.endpoints.insert(
            endpoint.to_string(),
            EndpointStats {
                requests: 1,
                errors: u64::from(is_error),
            },
        );
        sample
    }

    pub fn rate_limited_ratio(&self) -> f64 {
        ratio(self.rate_limited_requests, self.total_requests)
    }

    pub fn timeout_ratio(&self) -> f64 {
        ratio(self.timeout_requests, self.total_requests)
    }

    pub fn connection_error_ratio(&self) -> f64 {
        ratio(self.connection_errors, self.total_requests)
    }

    /// Endpoints that saw at least one error in this sample.
    pub fn failing_endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .endpoints
            .iter()
            .filter(|(_, stats)| stats.errors > 0)
            .map(|(name, _)| name.clone())
            .collect();
        endpoints.sort();
        endpoints
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
