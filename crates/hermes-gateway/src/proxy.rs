//! HTTP client for forwarding requests to the upstream.

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use reqwest::Client;

use crate::config::UpstreamSettings;
use crate::error::{GatewayError, GatewayResult};

/// Timeout for readiness probes, independent of the forwarding timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One outbound call. Built fresh for every forwarded request.
#[derive(Debug)]
pub struct UpstreamRequest {
    /// HTTP method, passed through unchanged.
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    /// Outbound headers.
    pub headers: HeaderMap,
    /// Request body, passed through unchanged.
    pub body: Bytes,
}

impl UpstreamRequest {
    /// Build a request for `{base_url}{path_and_query}`.
    pub fn build(
        base_url: &str,
        path_and_query: &str,
        method: Method,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            url: format!("{}{}", base_url.trim_end_matches('/'), path_and_query),
            headers,
            body,
        }
    }
}

/// Response relayed to the client.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Upstream status code. Non-2xx statuses are relayed, not errors.
    pub status: StatusCode,
    /// Upstream content type, if any.
    pub content_type: Option<HeaderValue>,
    /// Upstream body.
    pub body: Bytes,
}

/// Pooled client for the upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a new upstream client.
    pub fn new(settings: &UpstreamSettings) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| GatewayError::config(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        })
    }

    /// Issue exactly one upstream call.
    ///
    /// Transport failures, including a body that cannot be read to the end,
    /// become [`GatewayError::Upstream`]. No retries.
    pub async fn forward(&self, request: UpstreamRequest) -> GatewayResult<UpstreamResponse> {
        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| GatewayError::upstream(e.to_string()))?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::upstream(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    /// `GET {base_url}{path}` with a short timeout, returning the status.
    pub async fn probe(&self, path: &str) -> GatewayResult<StatusCode> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|response| response.status())
            .map_err(|e| GatewayError::upstream(e.to_string()))
    }

    /// Get the upstream base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let request = UpstreamRequest::build(
            "http://kong:8000/",
            "/framework/v1/update/x?framework=k12_v2",
            Method::PATCH,
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
        );
        assert_eq!(
            request.url,
            "http://kong:8000/framework/v1/update/x?framework=k12_v2"
        );
        assert_eq!(request.method, Method::PATCH);
    }

    #[test]
    fn test_client_trims_base_url() {
        let settings = UpstreamSettings {
            base_url: "http://kong:8000/".to_string(),
            ..UpstreamSettings::default()
        };
        let client = UpstreamClient::new(&settings).unwrap();
        assert_eq!(client.base_url(), "http://kong:8000");
        assert_eq!(client.timeout(), Duration::from_secs(240));
    }

    #[tokio::test]
    async fn test_transport_failure_is_upstream_error() {
        // Bind then drop a listener so the port is known to be closed.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let settings = UpstreamSettings {
            base_url: format!("http://127.0.0.1:{port}"),
            timeout: Duration::from_secs(2),
            ..UpstreamSettings::default()
        };
        let client = UpstreamClient::new(&settings).unwrap();
        let request = UpstreamRequest::build(
            client.base_url(),
            "/x",
            Method::GET,
            HeaderMap::new(),
            Bytes::new(),
        );

        let err = client.forward(request).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(!err.client_message().is_empty());
    }
}
