//! Configuration for the gateway.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML or
//! JSON file, then `HERMES_GATEWAY_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use hermes_core::{parse_role_list, AuthorizationPolicy};
use hermes_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};
use http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

const ENV_PREFIX: &str = "HERMES_GATEWAY_";

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings.
    pub gateway: GatewaySettings,
    /// Upstream settings.
    pub upstream: UpstreamSettings,
    /// Authorization policy lists.
    pub authorization: AuthorizationSettings,
    /// Session header names.
    pub session: SessionSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `HERMES_GATEWAY_*` environment variable overrides.
    pub fn with_env_overrides(self) -> GatewayResult<Self> {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from `lookup`, keyed by variable name without prefix.
    ///
    /// Unparseable values are rejected rather than silently ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.gateway.listen_addr = addr;
        }
        if let Some(port) = lookup("LISTEN_PORT") {
            self.gateway.listen_port = parse_env("LISTEN_PORT", &port)?;
        }
        if let Some(prefix) = lookup("MOUNT_PREFIX") {
            self.gateway.mount_prefix = prefix;
        }
        if let Some(timeout) = lookup("REQUEST_TIMEOUT") {
            self.gateway.request_timeout = parse_env_duration("REQUEST_TIMEOUT", &timeout)?;
        }
        if let Some(size) = lookup("MAX_BODY_SIZE") {
            self.gateway.max_request_body_size = parse_env("MAX_BODY_SIZE", &size)?;
        }

        if let Some(url) = lookup("UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(timeout) = lookup("UPSTREAM_TIMEOUT") {
            self.upstream.timeout = parse_env_duration("UPSTREAM_TIMEOUT", &timeout)?;
        }
        if let Some(credential) = lookup("SERVICE_CREDENTIAL") {
            self.upstream.service_credential = credential;
        }

        if let Some(ids) = lookup("MASTER_CATEGORY_IDS") {
            self.authorization.master_category_ids = parse_role_list(&ids);
        }
        if let Some(roles) = lookup("PRIVILEGED_ROLES") {
            self.authorization.privileged_roles = parse_role_list(&roles);
        }

        if let Some(trust) = lookup("TRUST_SESSION_HEADERS") {
            self.session.trust_headers = parse_env("TRUST_SESSION_HEADERS", &trust)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.telemetry.log_format = format;
        }
        if let Some(enabled) = lookup("METRICS_ENABLED") {
            self.telemetry.metrics_enabled = parse_env("METRICS_ENABLED", &enabled)?;
        }

        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        let base_url = &self.upstream.base_url;
        if base_url.is_empty() {
            return Err(GatewayError::config("upstream base_url is required"));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(GatewayError::config(
                "upstream base_url must start with http:// or https://",
            ));
        }

        let prefix = &self.gateway.mount_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(GatewayError::config(
                "mount_prefix must be empty or start with '/' and not end with '/'",
            ));
        }

        if self.gateway.request_timeout.is_zero() || self.upstream.timeout.is_zero() {
            return Err(GatewayError::config("timeouts must be greater than zero"));
        }
        if self.gateway.max_request_body_size == 0 {
            return Err(GatewayError::config(
                "max_request_body_size must be greater than zero",
            ));
        }

        for name in self.session.header_names() {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| GatewayError::config(format!("invalid session header: {name}")))?;
        }

        LogConfig::default()
            .with_format(&self.telemetry.log_format)
            .map_err(|e| GatewayError::config(e.to_string()))?;

        Ok(())
    }

    /// Build the authorization policy.
    pub fn policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy::new(
            clean_list(&self.authorization.master_category_ids),
            clean_list(&self.authorization.privileged_roles),
        )
    }

    /// Build the telemetry configuration.
    pub fn telemetry_config(&self) -> GatewayResult<TelemetryConfig> {
        let logging = LogConfig {
            level: self.telemetry.log_level.clone(),
            ..LogConfig::default()
        }
        .with_format(&self.telemetry.log_format)
        .map_err(|e| GatewayError::config(e.to_string()))?;

        Ok(TelemetryConfig::builder()
            .service_name(&self.telemetry.service_name)
            .service_version(crate::VERSION)
            .logging(logging)
            .metrics(MetricsConfig {
                enabled: self.telemetry.metrics_enabled,
                ..MetricsConfig::default()
            })
            .build())
    }
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> GatewayResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::config(format!("invalid value for {ENV_PREFIX}{key}: {value}")))
}

fn parse_env_duration(key: &str, value: &str) -> GatewayResult<Duration> {
    humantime_serde::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("invalid value for {ENV_PREFIX}{key}: {e}")))
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Path prefix under which requests are forwarded.
    pub mount_prefix: String,
    /// Overall deadline for one request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_request_body_size: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 3002,
            mount_prefix: "/proxies/v8".to_string(),
            request_timeout: Duration::from_secs(240),
            max_request_body_size: 50 * 1024 * 1024,
        }
    }
}

/// Upstream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Base URL the stripped request path is appended to.
    pub base_url: String,
    /// Timeout for upstream requests.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Value of the `Authorization` header sent upstream.
    pub service_credential: String,
    /// Upstream path probed by the readiness check. Empty disables the probe.
    pub health_path: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(240),
            service_credential: String::new(),
            health_path: "/health".to_string(),
        }
    }
}

/// Authorization lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    /// Numeric ids of shared master categories.
    pub master_category_ids: Vec<String>,
    /// Roles allowed to modify master categories.
    pub privileged_roles: Vec<String>,
}

/// Where the caller's session comes from.
///
/// The session headers are only honoured when `trust_headers` is set. Enable
/// it only behind an authentication layer that strips or overwrites these
/// headers on every inbound request; otherwise any client can claim any
/// tenant and role. With it unset, only an in-process
/// [`hermes_core::SessionContext`] request extension identifies the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Read the session from the headers below.
    pub trust_headers: bool,
    /// User id header.
    pub user_id_header: String,
    /// Auth token header.
    pub auth_token_header: String,
    /// Root organisation header.
    pub tenant_id_header: String,
    /// Comma-separated roles header.
    pub roles_header: String,
}

impl SessionSettings {
    fn header_names(&self) -> [&str; 4] {
        [
            self.user_id_header.as_str(),
            self.auth_token_header.as_str(),
            self.tenant_id_header.as_str(),
            self.roles_header.as_str(),
        ]
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            trust_headers: false,
            user_id_header: "x-session-user-id".to_string(),
            auth_token_header: "x-session-token".to_string(),
            tenant_id_header: "x-session-root-org-id".to_string(),
            roles_header: "x-session-roles".to_string(),
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Service name for telemetry.
    pub service_name: String,
    /// Log filter directive.
    pub log_level: String,
    /// `json` or `pretty`.
    pub log_format: String,
    /// Install the Prometheus recorder.
    pub metrics_enabled: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: "hermes-gateway".to_string(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.gateway.listen_addr = addr.into();
        self
    }

    /// Set the listen port.
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.gateway.listen_port = port;
        self
    }

    /// Set the mount prefix.
    #[must_use]
    pub fn mount_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.gateway.mount_prefix = prefix.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.gateway.request_timeout = timeout;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub fn max_request_body_size(mut self, size: usize) -> Self {
        self.config.gateway.max_request_body_size = size;
        self
    }

    /// Set the upstream base URL.
    #[must_use]
    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.config.upstream.base_url = url.into();
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.config.upstream.timeout = timeout;
        self
    }

    /// Set the service credential.
    #[must_use]
    pub fn service_credential(mut self, credential: impl Into<String>) -> Self {
        self.config.upstream.service_credential = credential.into();
        self
    }

    /// Set the master category ids.
    #[must_use]
    pub fn master_category_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.authorization.master_category_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set the privileged roles.
    #[must_use]
    pub fn privileged_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.authorization.privileged_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Trust the session headers written by the authentication layer.
    #[must_use]
    pub fn trust_session_headers(mut self, trust: bool) -> Self {
        self.config.session.trust_headers = trust;
        self
    }

    /// Enable or disable the metrics recorder.
    #[must_use]
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.telemetry.metrics_enabled = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GatewayResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Duration (de)serialization using `ms`, `s`, `m` and `h` suffixes.
mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let (digits, scale): (&str, fn(u64) -> Option<Duration>) =
            if let Some(n) = s.strip_suffix("ms") {
                (n, |ms| Some(Duration::from_millis(ms)))
            } else if let Some(n) = s.strip_suffix('s') {
                (n, |secs| Some(Duration::from_secs(secs)))
            } else if let Some(n) = s.strip_suffix('m') {
                (n, |m| m.checked_mul(60).map(Duration::from_secs))
            } else if let Some(n) = s.strip_suffix('h') {
                (n, |h| h.checked_mul(3600).map(Duration::from_secs))
            } else {
                // Bare numbers are seconds.
                (s, |secs| Some(Duration::from_secs(secs)))
            };

        digits
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(scale)
            .ok_or_else(|| format!("invalid duration: {s}"))
    }
}
