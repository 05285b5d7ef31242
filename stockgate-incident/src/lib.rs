//! Real-time outage detection for the stockgate gateway.
//!
//! Ingests per-provider metric samples (one per proxied request), keeps a
//! rolling history and baseline, classifies 5xx spikes, rate-limit storms,
//! timeout spikes and connection failures, and tracks incident lifecycle
//! (create, merge, resolve) with events published to an injected sink.

mod detector;
mod incident;
mod metrics;
mod sink;

pub use detector::{Baseline, DetectorConfig, IncidentDetector, IncidentSummary};
pub use incident::{incident_base_id, IncidentRecord, IncidentType, Severity};
pub use metrics::{EndpointStats, ProviderMetrics, RequestOutcome};
pub use sink::{ChannelSink, IncidentEvent, IncidentSink, NoopSink};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),
}
