//! Liveness and readiness checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::proxy::UpstreamClient;

/// Readiness status of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Ready to handle traffic.
    Ready,
    /// Not ready.
    NotReady,
}

impl ReadinessStatus {
    /// Check if the gateway is ready.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Liveness response served on `/healthcheck`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Fixed marker kept for existing load-balancer probes.
    pub everything: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Version information.
    pub version: String,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status.
    pub status: ReadinessStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
}

/// Result of a single readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time taken for the check in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
            duration_ms: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
            duration_ms: None,
        }
    }

    /// Set the duration.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Health checker for the gateway.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    ready: AtomicBool,
    upstream: Arc<UpstreamClient>,
    health_path: String,
}

impl HealthChecker {
    /// Create a health checker probing `health_path` on the upstream.
    ///
    /// An empty `health_path` disables the upstream probe.
    pub fn new(upstream: Arc<UpstreamClient>, health_path: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            upstream,
            health_path: health_path.into(),
        }
    }

    /// Mark the gateway as ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the gateway is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Get the uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Perform a liveness check.
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            everything: "is ok".to_string(),
            uptime_seconds: self.uptime().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Perform a readiness check.
    pub async fn readiness(&self) -> ReadinessResponse {
        let mut checks = vec![CheckResult::pass("config").with_message("configuration loaded")];

        if !self.health_path.is_empty() {
            checks.push(self.check_upstream().await);
        }

        let status = if self.is_ready() && checks.iter().all(|c| c.passed) {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };

        ReadinessResponse { status, checks }
    }

    /// Check upstream service health.
    pub async fn check_upstream(&self) -> CheckResult {
        let start = Instant::now();
        let check = match self.upstream.probe(&self.health_path).await {
            Ok(status) if status.is_success() => {
                CheckResult::pass("upstream").with_message(format!("status {status}"))
            }
            Ok(status) => CheckResult::fail("upstream", format!("unhealthy status: {status}")),
            Err(e) => CheckResult::fail("upstream", format!("connection failed: {e}")),
        };

        check.with_duration(start.elapsed())
    }
}
