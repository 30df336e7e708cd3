//! Gateway HTTP server implementation.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use hermes_core::ClassifiedOperation;
use hermes_telemetry::InFlightGuard;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::headers::{request_id_from, HEADER_REQUEST_ID};
use crate::health::HealthChecker;
use crate::pipeline::GatewayPipeline;
use crate::proxy::{UpstreamClient, UpstreamResponse};
use crate::session::{resolver_for, SessionResolver};

/// Liveness endpoint.
pub const HEALTHCHECK_PATH: &str = "/healthcheck";
/// Readiness endpoint.
pub const READY_PATH: &str = "/_hermes/ready";
/// Prometheus endpoint.
pub const METRICS_PATH: &str = "/_hermes/metrics";
/// Version endpoint.
pub const VERSION_PATH: &str = "/_hermes/version";

const INTERNAL_LABEL: &str = "internal";
const UNMOUNTED_LABEL: &str = "unmounted";

type BoxError = Box<dyn StdError + Send + Sync>;

/// Request handler shared by every connection.
///
/// Cheap to clone. Each call produces exactly one response.
#[derive(Debug, Clone)]
pub struct GatewayService {
    pipeline: Arc<GatewayPipeline>,
    health: Arc<HealthChecker>,
    request_timeout: Duration,
    max_body_size: usize,
}

impl GatewayService {
    /// Create a service with the session source selected by the config.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::with_resolver(config, resolver_for(&config.session)?)
    }

    /// Create a service with a custom session resolver.
    pub fn with_resolver(
        config: &GatewayConfig,
        resolver: Arc<dyn SessionResolver>,
    ) -> GatewayResult<Self> {
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);
        let health = Arc::new(HealthChecker::new(
            upstream.clone(),
            config.upstream.health_path.clone(),
        ));
        let pipeline = Arc::new(GatewayPipeline::new(
            Arc::new(config.policy()),
            upstream,
            resolver,
            config.upstream.service_credential.clone(),
            config.gateway.mount_prefix.clone(),
        ));

        Ok(Self {
            pipeline,
            health,
            request_timeout: config.gateway.request_timeout,
            max_body_size: config.gateway.max_request_body_size,
        })
    }

    /// The health checker.
    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// Handle one request.
    pub async fn call<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let request_id = request_id_from(request.headers());
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        async move {
            let _in_flight = InFlightGuard::new();
            let (label, mut response) = self.route(request, &request_id).await;

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(&HEADER_REQUEST_ID, value);
            }

            let status = response.status().as_u16();
            let elapsed = start.elapsed();
            hermes_telemetry::record_request(label, status, elapsed);
            info!(
                operation = label,
                status,
                bytes = response.body().size_hint().exact().unwrap_or(0),
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );

            response
        }
        .instrument(span)
        .await
    }

    async fn route<B>(
        &self,
        request: Request<B>,
        request_id: &str,
    ) -> (&'static str, Response<Full<Bytes>>)
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let path = request.uri().path().to_owned();

        if let Some(response) = self.internal_endpoint(&path).await {
            return (INTERNAL_LABEL, response);
        }

        if !self.pipeline.is_mounted(&path) {
            return (
                UNMOUNTED_LABEL,
                text_response(StatusCode::NOT_FOUND, "Not Found"),
            );
        }

        let operation = self.pipeline.classify(request.uri());
        let label = operation.kind().as_str();

        let result = tokio::time::timeout(
            self.request_timeout,
            self.forward(&operation, request, request_id),
        )
        .await
        .unwrap_or_else(|_| {
            warn!(
                timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                "request timed out, abandoning upstream call"
            );
            Err(GatewayError::Timeout)
        });

        let response = match result {
            Ok(upstream) => relay(upstream),
            Err(e) => {
                if e.status_code() >= 500 {
                    error!(error = %e, category = e.category(), "request failed");
                } else {
                    debug!(error = %e, category = e.category(), "request rejected");
                }
                error_response(&e)
            }
        };

        (label, response)
    }

    async fn forward<B>(
        &self,
        operation: &ClassifiedOperation,
        request: Request<B>,
        request_id: &str,
    ) -> GatewayResult<UpstreamResponse>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let body = Limited::new(body, self.max_body_size)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    GatewayError::PayloadTooLarge {
                        limit: self.max_body_size,
                    }
                } else {
                    GatewayError::bad_request(format!("failed to read request body: {e}"))
                }
            })?
            .to_bytes();

        self.pipeline
            .handle(operation, Request::from_parts(parts, body), request_id)
            .await
    }

    async fn internal_endpoint(&self, path: &str) -> Option<Response<Full<Bytes>>> {
        let response = match path {
            HEALTHCHECK_PATH => json_response(StatusCode::OK, &self.health.liveness()),
            READY_PATH => {
                let readiness = self.health.readiness().await;
                let status = if readiness.status.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                json_response(status, &readiness)
            }
            METRICS_PATH => match hermes_telemetry::render_metrics() {
                Some(body) => {
                    let mut response = Response::new(Full::new(Bytes::from(body)));
                    response.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    response
                }
                None => text_response(StatusCode::SERVICE_UNAVAILABLE, "metrics disabled"),
            },
            VERSION_PATH => json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "name": "hermes-gateway",
                    "version": crate::VERSION,
                }),
            ),
            _ => return None,
        };
        Some(response)
    }
}

/// Gateway server.
pub struct GatewayServer {
    addr: SocketAddr,
    service: GatewayService,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let ip = config
            .gateway
            .listen_addr
            .parse()
            .map_err(|e| GatewayError::config(format!("invalid listen address: {e}")))?;

        Ok(Self {
            addr: SocketAddr::new(ip, config.gateway.listen_port),
            service: GatewayService::new(config)?,
        })
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::server(format!("failed to bind {}: {e}", self.addr)))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve connections from `listener` until `shutdown` completes.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %listener.local_addr()?, "hermes gateway listening");
        self.service.health.set_ready(true);

        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let service = self.service.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let handler = service_fn(move |req: Request<Incoming>| {
                    let service = service.clone();
                    async move { Ok::<_, Infallible>(service.call(req).await) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                    debug!(peer = %peer_addr, error = %e, "connection error");
                }
            });
        }

        self.service.health.set_ready(false);
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn relay(upstream: UpstreamResponse) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(upstream.body));
    *response.status_mut() = upstream.status;
    if let Some(content_type) = upstream.content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message.to_owned())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn error_response(error: &GatewayError) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    text_response(status, &error.client_message())
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::DenyReason;

    #[test]
    fn test_error_response() {
        let response = error_response(&GatewayError::authorization_denied(
            DenyReason::TenantMismatch,
        ));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_relay_keeps_status_and_content_type() {
        let response = relay(UpstreamResponse {
            status: StatusCode::CONFLICT,
            content_type: Some(HeaderValue::from_static("application/json")),
            body: Bytes::from_static(b"{\"err\":1}"),
        });
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_json_response() {
        let response = json_response(StatusCode::OK, &serde_json::json!({"key": "value"}));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_server_rejects_bad_listen_addr() {
        let mut config = GatewayConfig::builder()
            .upstream_url("http://kong:8000")
            .build()
            .unwrap();
        config.gateway.listen_addr = "not-an-ip".to_string();
        assert!(GatewayServer::new(&config).is_err());
    }
}
