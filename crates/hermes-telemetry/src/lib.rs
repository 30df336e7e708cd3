//! Logging and metrics for the Hermes gateway.
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output
//! - **Metrics**: Prometheus text format via the `metrics` facade
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("hermes-gateway")
//!     .log_level("info")
//!     .build();
//!
//! init_telemetry(&config)?;
//! ```
//!
//! # Metrics Endpoint
//!
//! ```text
//! # TYPE hermes_requests_total counter
//! hermes_requests_total{operation="update",status="403",service="hermes-gateway"} 3
//! # TYPE hermes_authz_decisions_total counter
//! hermes_authz_decisions_total{operation="update",allowed="false",reason="tenant_mismatch",service="hermes-gateway"} 3
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use crate::metrics::{
    init_metrics, record_authz_decision, record_request, record_upstream_failure, render_metrics,
    InFlightGuard, MetricsConfig,
};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        metrics = config.metrics.enabled,
        "telemetry initialized"
    );
    Ok(())
}
