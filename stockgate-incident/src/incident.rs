use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    ServerErrorSpike,
    RateLimitSpike,
    TimeoutSpike,
    ConnectionErrorSpike,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerErrorSpike => "server_error_spike",
            Self::RateLimitSpike => "rate_limit_spike",
            Self::TimeoutSpike => "timeout_spike",
            Self::ConnectionErrorSpike => "connection_error_spike",
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered so merges can take the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic date-scoped incident id: repeated detections of the same
/// type on the same provider on the same calendar day map to one record.
pub fn incident_base_id(
    provider: &str,
    incident_type: IncidentType,
    date: NaiveDate,
) -> String {
    let canonical = format!("{provider}|{incident_type}|{date}");
    hex::encode(&Sha256::digest(canonical.as_bytes())[..8])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: String,
    pub provider: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub started_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    /// Error rate (or trigger-specific ratio) observed at the latest merge.
    pub error_rate: f64,
    pub error_count: u64,
    pub total_requests: u64,
    pub affected_endpoints: Vec<String>,
    pub description: String,
    pub resolution_notes: Option<String>,
    /// True when the relative-spike classifier fired for this record.
    pub spike_detected: bool,
    /// 1 for the first incident of its id on a given day; bumped when a new
    /// record is opened after an earlier same-day one was resolved.
    pub sequence: u32,
    pub metadata: HashMap<String, String>,
}

impl IncidentRecord {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}
