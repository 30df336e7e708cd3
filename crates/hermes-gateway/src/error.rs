//! Error types for the gateway.

use hermes_core::DenyReason;
use thiserror::Error;

/// Gateway errors.
///
/// Each variant maps to exactly one client-facing status code, see
/// [`GatewayError::status_code`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// A sensitive operation was refused.
    #[error("Authorization denied: {reason}")]
    AuthorizationDenied {
        /// Reason for denial.
        reason: DenyReason,
    },

    /// The upstream call failed at the transport level.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// The request body exceeded the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Limit in bytes.
        limit: usize,
    },

    /// The request could not be read.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// The request did not complete within the request timeout.
    #[error("Response timeout")]
    Timeout,

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl GatewayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authorization denied error.
    pub fn authorization_denied(reason: DenyReason) -> Self {
        Self::AuthorizationDenied { reason }
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthorizationDenied { .. } => 403,
            Self::Upstream { .. } => 500,
            Self::PayloadTooLarge { .. } => 413,
            Self::BadRequest { .. } => 400,
            Self::Timeout => 503,
            Self::Config { .. } | Self::Server { .. } | Self::Io(_) | Self::Http(_) => 500,
        }
    }

    /// Plain-text body sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::AuthorizationDenied { reason } => reason.message().to_string(),
            Self::Upstream { message } | Self::BadRequest { message } => message.clone(),
            Self::PayloadTooLarge { .. } => "Payload too large".to_string(),
            Self::Timeout => "Response timeout".to_string(),
            Self::Config { .. } | Self::Server { .. } | Self::Io(_) | Self::Http(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Get the error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::AuthorizationDenied { .. } => "authorization",
            Self::Upstream { .. } => "upstream",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest { .. } => "bad_request",
            Self::Timeout => "timeout",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::authorization_denied(DenyReason::TenantMismatch).status_code(),
            403
        );
        assert_eq!(GatewayError::upstream("connection refused").status_code(), 500);
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 10 }.status_code(),
            413
        );
        assert_eq!(GatewayError::bad_request("bad").status_code(), 400);
        assert_eq!(GatewayError::Timeout.status_code(), 503);
        assert_eq!(GatewayError::config("missing").status_code(), 500);
    }

    #[test]
    fn test_client_messages() {
        assert_eq!(
            GatewayError::authorization_denied(DenyReason::TenantMismatch).client_message(),
            "orgId does not match rootOrgId"
        );
        assert_eq!(
            GatewayError::upstream("connection refused").client_message(),
            "connection refused"
        );
        assert_eq!(GatewayError::Timeout.client_message(), "Response timeout");
        assert_eq!(
            GatewayError::config("secret detail").client_message(),
            "Internal server error"
        );
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::authorization_denied(DenyReason::MissingPrivilegedRole);
        assert!(err.to_string().starts_with("Authorization denied"));
        assert_eq!(err.category(), "authorization");

        let err = GatewayError::config("test");
        assert!(err.to_string().contains("Configuration error"));
    }
}
