use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use stockgate_incident::{
    ChannelSink, DetectorConfig, IncidentDetector, IncidentType, NoopSink,
    ProviderMetrics, Severity,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn sample_at(
    provider: &str,
    minute: i64,
    total: u64,
    errors: u64,
) -> ProviderMetrics {
    let mut sample =
        ProviderMetrics::empty(provider, start() + Duration::minutes(minute));
    sample.total_requests = total;
    sample.successful_requests = total.saturating_sub(errors);
    sample.error_requests = errors;
    sample.error_rate = if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    };
    sample
}

fn config() -> DetectorConfig {
    DetectorConfig {
        error_rate_threshold: 0.1,
        window_size_minutes: 60,
        min_requests: 5,
        spike_multiplier: 2.0,
    }
}

fn detector_with(config: DetectorConfig) -> IncidentDetector {
    IncidentDetector::new(config, Arc::new(NoopSink)).unwrap()
}

#[test]
fn threshold_boundary_respects_min_requests() {
    let detector = detector_with(config());

    // error_rate == threshold, but below the volume gate: no incident.
    let mut small = sample_at("getty", 0, 4, 0);
    small.error_rate = 0.1;
    detector.record_metrics(small);
    assert!(detector.active_incidents().is_empty());

    // Same rate at sufficient volume: exactly one incident.
    detector.record_metrics(sample_at("getty", 1, 10, 1));
    let active = detector.active_incidents();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].incident_type, IncidentType::ServerErrorSpike);
}

#[test]
fn scenario_ten_requests_five_errors_is_critical() {
    let detector = detector_with(config());
    detector.record_metrics(sample_at("getty", 0, 10, 5));

    let active = detector.active_incidents();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].severity, Severity::Critical);
    assert_eq!(active[0].error_count, 5);
    assert_eq!(active[0].total_requests, 10);
}

#[test]
fn spike_math_floors_zero_baseline() {
    let detector = detector_with(config());

    // Two clean samples establish a 0.0 baseline (floored to 0.01).
    detector.record_metrics(sample_at("getty", 0, 100, 0));
    detector.record_metrics(sample_at("getty", 1, 100, 0));

    // 0.5 / 0.01 = 50x >= multiplier 2.0.
    detector.record_metrics(sample_at("getty", 2, 100, 50));

    let active = detector.active_incidents();
    assert_eq!(active.len(), 1);
    assert!(active[0].spike_detected);
    assert_eq!(active[0].severity, Severity::Critical);
}

#[test]
fn same_day_detections_merge_into_one_record() {
    let detector = detector_with(config());
    detector.record_metrics(sample_at("getty", 0, 10, 5));
    detector.record_metrics(sample_at("getty", 5, 20, 8));

    let active = detector.active_incidents();
    assert_eq!(active.len(), 1);
    let record = &active[0];
    assert_eq!(record.error_count, 13);
    assert_eq!(record.total_requests, 30);
    assert_eq!(record.severity, Severity::Critical);
    assert_eq!(record.sequence, 1);
}

#[test]
fn rate_limit_storm_opens_its_own_incident_type() {
    let detector = detector_with(config());
    let mut sample = sample_at("unsplash", 0, 10, 0);
    sample.rate_limited_requests = 6;
    detector.record_metrics(sample);

    let active = detector.active_incidents();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].incident_type, IncidentType::RateLimitSpike);
    // 0.6 >= 0.5 escalates to High.
    assert_eq!(active[0].severity, Severity::High);
}

#[test]
fn timeout_and_connection_ratios_trigger() {
    let detector = detector_with(config());

    let mut sample = sample_at("pexels", 0, 20, 3);
    sample.timeout_requests = 3;
    detector.record_metrics(sample);

    let mut sample = sample_at("adobe_stock", 0, 20, 2);
    sample.connection_errors = 2;
    detector.record_metrics(sample);

    let types: Vec<IncidentType> = detector
        .active_incidents()
        .iter()
        .map(|record| record.incident_type)
        .collect();
    assert!(types.contains(&IncidentType::TimeoutSpike));
    assert!(types.contains(&IncidentType::ConnectionErrorSpike));
}

#[test]
fn recovery_needs_three_stable_samples() {
    let detector = detector_with(config());
    detector.record_metrics(sample_at("getty", 0, 10, 5));
    assert_eq!(detector.active_incidents().len(), 1);

    // Two clean samples are never enough.
    detector.record_metrics(sample_at("getty", 1, 100, 0));
    detector.record_metrics(sample_at("getty", 2, 100, 0));
    assert_eq!(detector.active_incidents().len(), 1);

    // Third stable sample at/below 0.5 * threshold resolves.
    detector.record_metrics(sample_at("getty", 3, 100, 0));
    assert!(detector.active_incidents().is_empty());

    let all = detector.all_incidents();
    assert_eq!(all.len(), 1);
    let record = &all[0];
    assert!(record.resolved_at.is_some());
    assert_eq!(record.duration_minutes, Some(3));
    assert!(record.resolution_notes.is_some());
}

#[test]
fn unstable_samples_do_not_resolve() {
    let mut config = config();
    // Ceiling is 0.5 * 0.2 = 0.1; rates below it but spread >= 0.05 stay open.
    config.error_rate_threshold = 0.2;
    config.spike_multiplier = 100.0;
    let detector = detector_with(config);

    detector.record_metrics(sample_at("getty", 0, 10, 5));
    assert_eq!(detector.active_incidents().len(), 1);

    detector.record_metrics(sample_at("getty", 1, 100, 0));
    detector.record_metrics(sample_at("getty", 2, 100, 9));
    detector.record_metrics(sample_at("getty", 3, 100, 1));
    assert_eq!(detector.active_incidents().len(), 1);
}

#[test]
fn same_day_retrigger_after_resolution_is_append_only() {
    let detector = detector_with(config());

    detector.record_metrics(sample_at("getty", 0, 10, 5));
    detector.record_metrics(sample_at("getty", 1, 100, 0));
    detector.record_metrics(sample_at("getty", 2, 100, 0));
    detector.record_metrics(sample_at("getty", 3, 100, 0));
    assert!(detector.active_incidents().is_empty());

    // Re-trigger the same type, same provider, same day.
    detector.record_metrics(sample_at("getty", 10, 10, 5));

    let all = detector.incidents_for_provider("getty");
    assert_eq!(all.len(), 2);

    let resolved = all.iter().find(|r| r.resolved_at.is_some()).unwrap();
    let reopened = all.iter().find(|r| r.resolved_at.is_none()).unwrap();

    // The resolved record keeps its history; the new one gets a fresh
    // sequence-suffixed id.
    assert_eq!(resolved.duration_minutes, Some(3));
    assert_eq!(resolved.sequence, 1);
    assert_eq!(reopened.sequence, 2);
    assert_eq!(reopened.id, format!("{}-2", resolved.id));
    assert_eq!(reopened.error_count, 5);
}

#[test]
fn incident_events_flow_through_sink() {
    let (sink, mut rx) = ChannelSink::channel();
    let detector = IncidentDetector::new(config(), Arc::new(sink)).unwrap();

    detector.record_metrics(sample_at("getty", 0, 10, 5));
    detector.record_metrics(sample_at("getty", 1, 20, 8));
    detector.record_metrics(sample_at("getty", 2, 100, 0));
    detector.record_metrics(sample_at("getty", 3, 100, 0));
    detector.record_metrics(sample_at("getty", 4, 100, 0));

    let kinds: Vec<&'static str> =
        std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.kind())).collect();
    assert_eq!(kinds, vec!["created", "merged", "resolved"]);
}

#[test]
fn summary_aggregates_by_severity_type_and_provider() {
    let detector = detector_with(config());
    detector.record_metrics(sample_at("getty", 0, 10, 5));

    let mut sample = sample_at("unsplash", 0, 10, 0);
    sample.rate_limited_requests = 3;
    detector.record_metrics(sample);

    // Resolve getty's incident.
    detector.record_metrics(sample_at("getty", 1, 100, 0));
    detector.record_metrics(sample_at("getty", 2, 100, 0));
    detector.record_metrics(sample_at("getty", 3, 100, 0));

    let summary = detector.summary();
    assert_eq!(summary.total_incidents, 2);
    assert_eq!(summary.active_incidents, 1);
    assert_eq!(summary.by_provider.get("getty"), Some(&1));
    assert_eq!(summary.by_provider.get("unsplash"), Some(&1));
    assert_eq!(summary.by_severity.get("critical"), Some(&1));
    assert_eq!(summary.by_severity.get("medium"), Some(&1));
    assert_eq!(summary.by_type.get("server_error_spike"), Some(&1));
    assert_eq!(summary.by_type.get("rate_limit_spike"), Some(&1));
    assert!((summary.average_resolution_minutes - 3.0).abs() < 1e-9);
    assert_eq!(summary.max_resolution_minutes, 3);
}

#[test]
fn zero_valued_samples_never_panic() {
    let detector = detector_with(config());
    detector.record_metrics(ProviderMetrics::empty("getty", start()));
    detector.record_metrics(ProviderMetrics::empty("getty", start()));
    assert!(detector.active_incidents().is_empty());
    assert_eq!(detector.summary().total_incidents, 0);
}
