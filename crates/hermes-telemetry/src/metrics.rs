//! Prometheus metrics.
//!
//! The recorder is installed without an HTTP listener; the gateway renders
//! the registry from its own `/_hermes/metrics` endpoint.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `hermes_requests_total` | Counter | `operation`, `status` |
//! | `hermes_request_duration_seconds` | Histogram | `operation` |
//! | `hermes_in_flight_requests` | Gauge | - |
//! | `hermes_authz_decisions_total` | Counter | `operation`, `allowed`, `reason` |
//! | `hermes_upstream_failures_total` | Counter | - |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const REQUESTS_TOTAL: &str = "hermes_requests_total";
const REQUEST_DURATION: &str = "hermes_request_duration_seconds";
const IN_FLIGHT: &str = "hermes_in_flight_requests";
const AUTHZ_DECISIONS: &str = "hermes_authz_decisions_total";
const UPSTREAM_FAILURES: &str = "hermes_upstream_failures_total";

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Service name, exported as a global `service` label.
    pub service_name: String,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "hermes-gateway".to_string(),
            // Upstream calls may legitimately run for minutes.
            duration_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 240.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Calling this more than once is harmless: only the first handle is kept.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the recorder cannot be built or
/// another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests handled by the gateway");
    describe_histogram!(REQUEST_DURATION, "End-to-end request duration in seconds");
    describe_gauge!(IN_FLIGHT, "Number of requests currently being processed");
    describe_counter!(
        AUTHZ_DECISIONS,
        "Authorization decisions on sensitive operations"
    );
    describe_counter!(UPSTREAM_FAILURES, "Upstream calls that failed at the transport level");
}

/// Records a completed request.
pub fn record_request(operation: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Records an authorization decision.
///
/// `reason` is a short label such as `tenant_mismatch`, or `allowed`.
pub fn record_authz_decision(operation: &str, allowed: bool, reason: &str) {
    counter!(
        AUTHZ_DECISIONS,
        "operation" => operation.to_string(),
        "allowed" => allowed.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Records an upstream transport failure.
pub fn record_upstream_failure() {
    counter!(UPSTREAM_FAILURES).increment(1);
}

/// Decrements the in-flight gauge on drop.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}
