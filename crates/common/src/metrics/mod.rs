//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all PartForge metrics
pub const METRICS_PREFIX: &str = "partforge";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
];

/// Buckets for classifier round-trips (web-search-backed calls are slow)
pub const CLASSIFIER_BUCKETS: &[f64] = &[
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
    120.0, // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Job metrics
    describe_counter!(
        format!("{}_jobs_total", METRICS_PREFIX),
        Unit::Count,
        "Total enrichment jobs started"
    );

    describe_gauge!(
        format!("{}_jobs_in_flight", METRICS_PREFIX),
        Unit::Count,
        "Enrichment jobs currently streaming"
    );

    // Chunk metrics
    describe_counter!(
        format!("{}_chunks_dispatched_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks dispatched to the classifier"
    );

    describe_counter!(
        format!("{}_chunks_failed_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunk-scoped classifier failures"
    );

    describe_counter!(
        format!("{}_parts_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Total parts excluded by the stocking-decision rule"
    );

    // Classifier metrics
    describe_counter!(
        format!("{}_classifier_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total classifier API requests"
    );

    describe_histogram!(
        format!("{}_classifier_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Classifier round-trip latency in seconds"
    );

    describe_counter!(
        format!("{}_classifier_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total classifier API errors"
    );

    // Reconciliation metrics
    describe_counter!(
        format!("{}_results_merged_total", METRICS_PREFIX),
        Unit::Count,
        "Total results merged into part records"
    );

    describe_counter!(
        format!("{}_results_unmatched_total", METRICS_PREFIX),
        Unit::Count,
        "Results dropped because no record matched their identity key"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a classifier round-trip
pub fn record_classifier_call(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_classifier_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_classifier_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_classifier_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a job start
pub fn record_job_start(kind: &str, total_records: usize, total_skipped: usize) {
    counter!(
        format!("{}_jobs_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);

    counter!(
        format!("{}_parts_skipped_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(total_skipped as u64);

    gauge!(format!("{}_jobs_in_flight", METRICS_PREFIX)).increment(1.0);

    tracing::debug!(kind, total_records, total_skipped, "Job metrics recorded");
}

/// Helper to record a job end
pub fn record_job_end() {
    gauge!(format!("{}_jobs_in_flight", METRICS_PREFIX)).decrement(1.0);
}

/// Helper to record merge outcomes
pub fn record_merge(merged: usize, unmatched: usize) {
    counter!(format!("{}_results_merged_total", METRICS_PREFIX)).increment(merged as u64);
    counter!(format!("{}_results_unmatched_total", METRICS_PREFIX)).increment(unmatched as u64);
}
