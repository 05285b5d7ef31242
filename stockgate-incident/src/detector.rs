//! Outage detection over per-provider metric samples: rolling history,
//! baseline aggregation, threshold/spike classification and the incident
//! create/merge/resolve lifecycle.

use crate::incident::{incident_base_id, IncidentRecord, IncidentType, Severity};
use crate::metrics::ProviderMetrics;
use crate::sink::{IncidentEvent, IncidentSink};
use crate::IncidentError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Share of requests that must be rate-limited / timed out / connection
/// failures before the corresponding incident type triggers.
const RATE_LIMIT_RATIO_THRESHOLD: f64 = 0.20;
const TIMEOUT_RATIO_THRESHOLD: f64 = 0.10;
const CONNECTION_ERROR_RATIO_THRESHOLD: f64 = 0.05;
/// Secondary-trigger ratio at which severity escalates to High.
const SECONDARY_HIGH_RATIO: f64 = 0.5;
/// Baseline error-rate floor for the relative-spike division.
const BASELINE_FLOOR: f64 = 0.01;
/// Recovery needs this many trailing samples under the ceiling...
const RECOVERY_SAMPLES: usize = 3;
/// ...whose error rates span less than this range.
const RECOVERY_STABILITY_RANGE: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub error_rate_threshold: f64,
    pub window_size_minutes: i64,
    pub min_requests: u64,
    pub spike_multiplier: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.1,
            window_size_minutes: 5,
            min_requests: 5,
            spike_multiplier: 3.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), IncidentError> {
        if !(0.0..=1.0).contains(&self.error_rate_threshold)
            || self.error_rate_threshold == 0.0
        {
            return Err(IncidentError::InvalidConfig(
                "error_rate_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.window_size_minutes <= 0 {
            return Err(IncidentError::InvalidConfig(
                "window_size_minutes must be positive".to_string(),
            ));
        }
        if self.spike_multiplier <= 1.0 {
            return Err(IncidentError::InvalidConfig(
                "spike_multiplier must exceed 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Request-weighted aggregate of the retained samples, excluding the newest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub error_rate: f64,
    pub total_requests: u64,
    pub average_response_time_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentSummary {
    pub total_incidents: usize,
    pub active_incidents: usize,
    pub by_severity: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
    pub by_provider: HashMap<String, usize>,
    pub average_resolution_minutes: f64,
    pub max_resolution_minutes: i64,
}

#[derive(Debug, Clone)]
struct Trigger {
    incident_type: IncidentType,
    severity: Severity,
    /// Ratio that tripped this trigger, recorded on the incident.
    ratio: f64,
    /// Count contribution for the merge accumulator.
    error_count: u64,
    spike_detected: bool,
    description: String,
}

struct DetectorState {
    histories: HashMap<String, VecDeque<ProviderMetrics>>,
    baselines: HashMap<String, Baseline>,
    /// Active incidents keyed by date-scoped base id.
    active: HashMap<String, IncidentRecord>,
    resolved: Vec<IncidentRecord>,
}

pub struct IncidentDetector {
    config: DetectorConfig,
    sink: Arc<dyn IncidentSink>,
    state: Mutex<DetectorState>,
}

impl IncidentDetector {
    pub fn new(
        config: DetectorConfig,
        sink: Arc<dyn IncidentSink>,
    ) -> Result<Self, IncidentError> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            state: Mutex::new(DetectorState {
                histories: HashMap::new(),
                baselines: HashMap::new(),
                active: HashMap::new(),
                resolved: Vec::new(),
            }),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Ingest one sample. Never raises: partial samples simply fail to trip
    /// thresholds, and a poisoned lock is recovered rather than propagated.
    pub fn record_metrics(&self, sample: ProviderMetrics) {
        let mut state = self.lock_state();
        let provider = sample.provider.clone();

        let history = state.histories.entry(provider.clone()).or_default();
        history.push_back(sample.clone());
        let window = Duration::minutes(self.config.window_size_minutes);
        let horizon = sample.recorded_at - window;
        while history
            .front()
            .is_some_and(|oldest| oldest.recorded_at < horizon)
        {
            history.pop_front();
        }

        let baseline = aggregate_baseline(history);
        match baseline {
            Some(baseline) => {
                state.baselines.insert(provider.clone(), baseline);
            }
            None => {
                state.baselines.remove(&provider);
            }
        }

        // Too few requests to classify; the sample still extends history.
        if sample.total_requests < self.config.min_requests {
            return;
        }

        let triggers = self.evaluate_triggers(&sample, baseline);
        if triggers.is_empty() {
            self.check_recovery(&mut state, &sample);
        } else {
            for trigger in triggers {
                self.upsert_incident(&mut state, &sample, trigger);
            }
        }
    }

    fn evaluate_triggers(
        &self,
        sample: &ProviderMetrics,
        baseline: Option<Baseline>,
    ) -> Vec<Trigger> {
        let mut triggers = Vec::new();

        // Absolute 5xx threshold and relative spike share one incident type;
        // evaluate both and fold them into a single trigger.
        let mut server_error: Option<Trigger> = None;
        if sample.error_rate >= self.config.error_rate_threshold {
            server_error = Some(Trigger {
                incident_type: IncidentType::ServerErrorSpike,
                severity: severity_for_error_rate(sample.error_rate),
                ratio: sample.error_rate,
                error_count: sample.error_requests,
                spike_detected: false,
                description: format!(
                    "Error rate {:.2} breached threshold {:.2} for {}",
                    sample.error_rate, self.config.error_rate_threshold, sample.provider
                ),
            });
        }
        if let Some(baseline) = baseline {
            let floor = baseline.error_rate.max(BASELINE_FLOOR);
            let spike_ratio = sample.error_rate / floor;
            if spike_ratio >= self.config.spike_multiplier {
                let severity = severity_for_error_rate(sample.error_rate)
                    .max(severity_for_spike_ratio(spike_ratio));
                let description = format!(
                    "Error rate {:.2} is {:.1}x the rolling baseline {:.2} for {}",
                    sample.error_rate, spike_ratio, baseline.error_rate, sample.provider
                );
                server_error = Some(match server_error {
                    Some(absolute) => Trigger {
                        severity: absolute.severity.max(severity),
                        spike_detected: true,
                        ..absolute
                    },
                    None => Trigger {
                        incident_type: IncidentType::ServerErrorSpike,
                        severity,
                        ratio: sample.error_rate,
                        error_count: sample.error_requests,
                        spike_detected: true,
                        description,
                    },
                });
            }
        }
        triggers.extend(server_error);

        let rate_limited = sample.rate_limited_ratio();
        if rate_limited >= RATE_LIMIT_RATIO_THRESHOLD {
            triggers.push(Trigger {
                incident_type: IncidentType::RateLimitSpike,
                severity: severity_for_secondary_ratio(rate_limited),
                ratio: rate_limited,
                error_count: sample.rate_limited_requests,
                spike_detected: false,
                description: format!(
                    "{:.0}% of requests rate-limited by {}",
                    rate_limited * 100.0,
                    sample.provider
                ),
            });
        }

        let timeouts = sample.timeout_ratio();
        if timeouts >= TIMEOUT_RATIO_THRESHOLD {
            triggers.push(Trigger {
                incident_type: IncidentType::TimeoutSpike,
                severity: severity_for_secondary_ratio(timeouts),
                ratio: timeouts,
                error_count: sample.timeout_requests,
                spike_detected: false,
                description: format!(
                    "{:.0}% of requests to {} timed out",
                    timeouts * 100.0,
                    sample.provider
                ),
            });
        }

        let connection_errors = sample.connection_error_ratio();
        if connection_errors >= CONNECTION_ERROR_RATIO_THRESHOLD {
            triggers.push(Trigger {
                incident_type: IncidentType::ConnectionErrorSpike,
                severity: severity_for_secondary_ratio(connection_errors),
                ratio: connection_errors,
                error_count: sample.connection_errors,
                spike_detected: false,
                description: format!(
                    "{:.0}% of requests to {} failed to connect",
                    connection_errors * 100.0,
                    sample.provider
                ),
            });
        }

        triggers
    }

    fn upsert_incident(
        &self,
        state: &mut DetectorState,
        sample: &ProviderMetrics,
        trigger: Trigger,
    ) {
        let date = sample.recorded_at.date_naive();
        let base_id =
            incident_base_id(&sample.provider, trigger.incident_type, date);

        if let Some(record) = state.active.get_mut(&base_id) {
            record.severity = record.severity.max(trigger.severity);
            record.error_count += trigger.error_count;
            record.total_requests += sample.total_requests;
            record.error_rate = trigger.ratio;
            record.spike_detected |= trigger.spike_detected;
            for endpoint in sample.failing_endpoints() {
                if !record.affected_endpoints.contains(&endpoint) {
                    record.affected_endpoints.push(endpoint);
                }
            }
            debug!(
                "Merged {} detection into incident {} for {}",
                record.incident_type, record.id, record.provider
            );
            self.sink.publish(IncidentEvent::Merged(record.clone()));
            return;
        }

        // Incidents are append-only: a re-trigger after a same-day
        // resolution opens a fresh record with a bumped sequence instead of
        // overwriting the resolved one.
        let prior_same_day = state
            .resolved
            .iter()
            .filter(|record| {
                record.provider == sample.provider
                    && record.incident_type == trigger.incident_type
                    && record.started_at.date_naive() == date
            })
            .count() as u32;
        let sequence = prior_same_day + 1;
        let id = if sequence == 1 {
            base_id.clone()
        } else {
            format!("{base_id}-{sequence}")
        };

        let record = IncidentRecord {
            id,
            provider: sample.provider.clone(),
            incident_type: trigger.incident_type,
            severity: trigger.severity,
            started_at: sample.recorded_at,
            resolved_at: None,
            duration_minutes: None,
            error_rate: trigger.ratio,
            error_count: trigger.error_count,
            total_requests: sample.total_requests,
            affected_endpoints: sample.failing_endpoints(),
            description: trigger.description,
            resolution_notes: None,
            spike_detected: trigger.spike_detected,
            sequence,
            metadata: HashMap::new(),
        };
        info!(
            "Opened {} incident {} ({}) for {}",
            record.severity, record.id, record.incident_type, record.provider
        );
        self.sink.publish(IncidentEvent::Created(record.clone()));
        state.active.insert(base_id, record);
    }

    /// A clean sample resolves the provider's active incidents once the
    /// error rate has stayed low and stable for the trailing samples.
    fn check_recovery(&self, state: &mut DetectorState, sample: &ProviderMetrics) {
        let ceiling = self.config.error_rate_threshold * 0.5;
        if sample.error_rate > ceiling {
            return;
        }

        let Some(history) = state.histories.get(&sample.provider) else {
            return;
        };
        if history.len() < RECOVERY_SAMPLES {
            return;
        }
        let recent: Vec<f64> = history
            .iter()
            .rev()
            .take(RECOVERY_SAMPLES)
            .map(|s| s.error_rate)
            .collect();
        if recent.iter().any(|rate| *rate > ceiling) {
            return;
        }
        let max = recent.iter().cloned().fold(f64::MIN, f64::max);
        let min = recent.iter().cloned().fold(f64::MAX, f64::min);
        if max - min >= RECOVERY_STABILITY_RANGE {
            return;
        }

        let resolved_ids: Vec<String> = state
            .active
            .iter()
            .filter(|(_, record)| record.provider == sample.provider)
            .map(|(base_id, _)| base_id.clone())
            .collect();
        for base_id in resolved_ids {
            let Some(mut record) = state.active.remove(&base_id) else {
                continue;
            };
            record.resolved_at = Some(sample.recorded_at);
            record.duration_minutes =
                Some((sample.recorded_at - record.started_at).num_minutes().max(0));
            record.resolution_notes = Some(format!(
                "Error rate held at or below {:.3} across {} consecutive samples",
                ceiling, RECOVERY_SAMPLES
            ));
            info!(
                "Resolved incident {} for {} after {} minutes",
                record.id,
                record.provider,
                record.duration_minutes.unwrap_or(0)
            );
            self.sink.publish(IncidentEvent::Resolved(record.clone()));
            state.resolved.push(record);
        }
    }

    pub fn baseline_for(&self, provider: &str) -> Option<Baseline> {
        self.lock_state().baselines.get(provider).copied()
    }

    pub fn active_incidents(&self) -> Vec<IncidentRecord> {
        let state = self.lock_state();
        let mut incidents: Vec<IncidentRecord> =
            state.active.values().cloned().collect();
        incidents.sort_by_key(|record| record.started_at);
        incidents
    }

    pub fn all_incidents(&self) -> Vec<IncidentRecord> {
        let state = self.lock_state();
        let mut incidents: Vec<IncidentRecord> = state
            .active
            .values()
            .chain(state.resolved.iter())
            .cloned()
            .collect();
        incidents.sort_by_key(|record| record.started_at);
        incidents
    }

    pub fn incidents_for_provider(&self, provider: &str) -> Vec<IncidentRecord> {
        self.all_incidents()
            .into_iter()
            .filter(|record| record.provider == provider)
            .collect()
    }

    pub fn summary(&self) -> IncidentSummary {
        let incidents = self.all_incidents();
        let mut summary = IncidentSummary {
            total_incidents: incidents.len(),
            ..Default::default()
        };

        let mut durations: Vec<i64> = Vec::new();
        for record in &incidents {
            if record.is_active() {
                summary.active_incidents += 1;
            }
            *summary
                .by_severity
                .entry(record.severity.as_str().to_string())
                .or_insert(0) += 1;
            *summary
                .by_type
                .entry(record.incident_type.as_str().to_string())
                .or_insert(0) += 1;
            *summary
                .by_provider
                .entry(record.provider.clone())
                .or_insert(0) += 1;
            if let Some(minutes) = record.duration_minutes {
                durations.push(minutes);
            }
        }

        if !durations.is_empty() {
            summary.average_resolution_minutes =
                durations.iter().sum::<i64>() as f64 / durations.len() as f64;
            summary.max_resolution_minutes =
                durations.iter().copied().max().unwrap_or(0);
        }
        summary
    }

    fn lock_state(&self) -> MutexGuard<'_, DetectorState> {
        // recordMetrics is contractually infallible; recover the guard if a
        // panicking reader poisoned it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for IncidentDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("IncidentDetector")
            .field("config", &self.config)
            .field("providers", &state.histories.len())
            .field("active_incidents", &state.active.len())
            .field("resolved_incidents", &state.resolved.len())
            .finish()
    }
}

/// Aggregate every retained sample except the newest. Needs at least two
/// retained samples; rates are weighted by request volume.
fn aggregate_baseline(history: &VecDeque<ProviderMetrics>) -> Option<Baseline> {
    if history.len() < 2 {
        return None;
    }
    let older = history.iter().take(history.len() - 1);

    let mut total_requests = 0u64;
    let mut error_requests = 0u64;
    let mut latency_weighted = 0.0f64;
    for sample in older {
        total_requests += sample.total_requests;
        error_requests += sample.error_requests;
        latency_weighted +=
            sample.average_response_time_ms * sample.total_requests as f64;
    }

    Some(Baseline {
        error_rate: if total_requests == 0 {
            0.0
        } else {
            error_requests as f64 / total_requests as f64
        },
        total_requests,
        average_response_time_ms: if total_requests == 0 {
            0.0
        } else {
            latency_weighted / total_requests as f64
        },
    })
}

fn severity_for_error_rate(error_rate: f64) -> Severity {
    if error_rate >= 0.5 {
        Severity::Critical
    } else if error_rate >= 0.3 {
        Severity::High
    } else if error_rate >= 0.15 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn severity_for_spike_ratio(spike_ratio: f64) -> Severity {
    if spike_ratio >= 5.0 {
        Severity::High
    } else if spike_ratio >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn severity_for_secondary_ratio(ratio: f64) -> Severity {
    if ratio >= SECONDARY_HIGH_RATIO {
        Severity::High
    } else {
        Severity::Medium
    }
}
