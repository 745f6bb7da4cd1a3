// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the PostgreSQL operator.
//!
//! All metrics carry the namespace prefix `kubedb_com_` (prometheus-safe version
//! of "kubedb.com") and are registered on [`METRICS_REGISTRY`].
//!
//! # Metrics Categories
//!
//! - **Reconciliation** - passes, durations and requeues per kind
//! - **Resource lifecycle** - offshoot objects created and deleted
//! - **Errors** - failures by category
//! - **Health checks** - probe outcomes and tick durations
//! - **Admission** - webhook decisions
//!
//! # Example
//!
//! ```rust,no_run
//! use postgres_operator::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("Postgres", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all operator metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "kubedb_com";

/// Global Prometheus metrics registry, exposed on `/metrics`.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: `Postgres` or `DormantDatabase`
/// - `status`: `success`, `error` or `requeue`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 1800.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Requeues by resource type and reason
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeues by resource type and reason",
    );
    let counter = CounterVec::new(opts, &["resource_type", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of offshoot objects created or applied by kind",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of offshoot objects deleted by kind",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Databases per phase, refreshed on every reconciliation
pub static DATABASES_BY_PHASE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_postgres_phase"),
        "1 for the current phase of each Postgres, 0 otherwise",
    );
    let gauge = GaugeVec::new(opts, &["namespace", "name", "phase"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error category",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Health Check Metrics
// ============================================================================

/// Probe outcomes
///
/// Labels:
/// - `target`: `pod`, `primary` or `cluster`
/// - `result`: `online` or the [`crate::errors::ProbeError::kind`] of the failure
pub static HEALTH_PROBES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_health_probes_total"),
        "Total number of database liveness probes by target and result",
    );
    let counter = CounterVec::new(opts, &["target", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Wall time of one health-check tick across all instances
pub static HEALTH_TICK_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_health_tick_duration_seconds"),
        "Duration of one health check tick in seconds",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Admission Metrics
// ============================================================================

pub static ADMISSION_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_admission_requests_total"),
        "Total number of admission reviews by operation and result",
    );
    let counter = CounterVec::new(opts, &["operation", "result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helpers
// ============================================================================

/// Record a successful reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

pub fn record_resource_created(resource_type: &str) {
    RESOURCES_CREATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

pub fn record_resource_deleted(resource_type: &str) {
    RESOURCES_DELETED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where the error occurred
/// * `error_type` - Category of error (e.g., `api_error`, `validation_error`)
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Set the phase gauge of one database, zeroing its other phases.
pub fn record_phase(namespace: &str, name: &str, phase: &str) {
    for candidate in [
        "Creating",
        "Initializing",
        "Running",
        "Halted",
        "Failed",
        "WipedOut",
    ] {
        let value = if candidate == phase { 1.0 } else { 0.0 };
        DATABASES_BY_PHASE
            .with_label_values(&[namespace, name, candidate])
            .set(value);
    }
}

/// Drop the phase series of a database that no longer exists.
pub fn forget_phase(namespace: &str, name: &str) {
    for candidate in [
        "Creating",
        "Initializing",
        "Running",
        "Halted",
        "Failed",
        "WipedOut",
    ] {
        let _ = DATABASES_BY_PHASE.remove_label_values(&[namespace, name, candidate]);
    }
}

pub fn record_health_probe(target: &str, result: &str) {
    HEALTH_PROBES_TOTAL
        .with_label_values(&[target, result])
        .inc();
}

pub fn record_health_tick(duration: Duration) {
    HEALTH_TICK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_admission(operation: &str, result: &str) {
    ADMISSION_REQUESTS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        record_reconciliation_success("TestPostgres", Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&["TestPostgres", "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&["TestPostgres"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_phase_is_one_hot() {
        record_phase("metrics-test", "pg", "Running");
        record_phase("metrics-test", "pg", "Halted");

        let running = DATABASES_BY_PHASE.with_label_values(&["metrics-test", "pg", "Running"]);
        let halted = DATABASES_BY_PHASE.with_label_values(&["metrics-test", "pg", "Halted"]);
        assert!((running.get() - 0.0).abs() < f64::EPSILON);
        assert!((halted.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_health_probe() {
        record_health_probe("primary", "timeout");
        assert!(
            HEALTH_PROBES_TOTAL
                .with_label_values(&["primary", "timeout"])
                .get()
                > 0.0
        );
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));
        record_admission("CREATE", "allowed");

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("kubedb_com"));
        assert!(metrics_text.contains("reconciliations_total"));
        assert!(metrics_text.contains("admission_requests_total"));
    }
}
