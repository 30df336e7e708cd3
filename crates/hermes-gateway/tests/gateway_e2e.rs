//! End-to-end tests driving the gateway service against a mock upstream.

use std::time::Duration;

use bytes::Bytes;
use hermes_gateway::{GatewayConfig, GatewayService};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(upstream_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::builder()
        .upstream_url(upstream_url)
        .service_credential("Bearer svc-token")
        .master_category_ids(["1", "2"])
        .privileged_roles(["ORG_ADMIN"])
        .upstream_timeout(Duration::from_secs(5))
        .request_timeout(Duration::from_secs(5))
        .metrics_enabled(false)
        .trust_session_headers(true)
        .build()
        .unwrap();
    config.upstream.health_path = String::new();
    config
}

fn service(config: &GatewayConfig) -> GatewayService {
    GatewayService::new(config).unwrap()
}

fn request(method: &str, uri: &str, tenant: &str, body: &'static str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", "connect.sid=abc")
        .header("x-session-user-id", "u-1")
        .header("x-session-token", "user-token")
        .header("x-session-root-org-id", tenant)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

async fn body_text(response: Response<Full<Bytes>>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_update_for_owning_tenant_is_forwarded_with_identity() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/update/x"))
        .and(query_param("framework", "k12_v2"))
        .and(header("authorization", "Bearer svc-token"))
        .and(header("x-authenticated-user-id", "u-1"))
        .and(header("x-authenticated-user-orgid", "k12"))
        .and(header("x-authenticated-user-token", "user-token"))
        .and(body_string("{\"name\":\"K12\"}"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string("{\"ok\":true}"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request(
            "PUT",
            "/proxies/v8/update/x?framework=k12_v2",
            "k12",
            "{\"name\":\"K12\"}",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_text(response).await, "{\"ok\":true}");

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].headers.get("cookie").is_none());
    assert!(received[0].headers.get("x-session-token").is_none());
}

#[tokio::test]
async fn test_update_for_other_tenant_is_denied_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request(
            "PUT",
            "/proxies/v8/update/x?framework=k12_v2",
            "other",
            "{}",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "orgId does not match rootOrgId");
}

#[tokio::test]
async fn test_master_category_requires_privileged_role() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));

    let denied = service
        .call(request("POST", "/proxies/v8/create/x?framework=1", "1", "{}"))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(denied).await,
        "User does not have the required role to update the framework"
    );

    let mut allowed = request("POST", "/proxies/v8/create/x?framework=1", "9", "{}");
    allowed
        .headers_mut()
        .insert("x-session-roles", "VIEWER, ORG_ADMIN".parse().unwrap());
    let response = service.call(allowed).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_publish_without_id_passes_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content/v1/publish/_draft"))
        .respond_with(ResponseTemplate::new(200).set_body_string("published"))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request(
            "POST",
            "/proxies/v8/content/v1/publish/_draft",
            "other",
            "",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "published");
}

#[tokio::test]
async fn test_publish_id_is_tenant_checked() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content/v1/publish/k12_v1"))
        .and(header("x-authenticated-user-orgid", "k12"))
        .respond_with(ResponseTemplate::new(200).set_body_string("published"))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));

    let allowed = service
        .call(request(
            "POST",
            "/proxies/v8/content/v1/publish/k12_v1",
            "k12",
            "{}",
        ))
        .await;
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(body_text(allowed).await, "published");

    let denied = service
        .call(request(
            "POST",
            "/proxies/v8/content/v1/publish/k12_v1",
            "other",
            "{}",
        ))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(denied).await, "orgId does not match rootOrgId");
}

#[tokio::test]
async fn test_publish_master_category_requires_privileged_role() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content/v1/publish/2_v1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));

    let denied = service
        .call(request(
            "POST",
            "/proxies/v8/content/v1/publish/2_v1",
            "2",
            "{}",
        ))
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(denied).await,
        "User does not have the required role to update the framework"
    );

    let mut privileged = request("POST", "/proxies/v8/content/v1/publish/2_v1", "k12", "{}");
    privileged
        .headers_mut()
        .insert("x-session-roles", "ORG_ADMIN".parse().unwrap());
    assert_eq!(service.call(privileged).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_framework_with_empty_prefix_is_denied() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request(
            "PUT",
            "/proxies/v8/framework/v1/update/x?framework=_other",
            "k12",
            "{}",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "orgId does not match rootOrgId");
}

#[tokio::test]
async fn test_session_headers_ignored_unless_trusted() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut config = config(&upstream.uri());
    config.session.trust_headers = false;
    let service = service(&config);

    let response = service
        .call(request(
            "PUT",
            "/proxies/v8/update/x?framework=k12_v2",
            "k12",
            "{}",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_generic_request_passes_through_for_anonymous_caller() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/v1"))
        .and(query_param("q", "math"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let anonymous = Request::builder()
        .uri("/proxies/v8/search/v1?q=math")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = service.call(anonymous).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "[]");

    let received = upstream.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-authenticated-user-id").is_none());
    assert!(received[0].headers.get("authorization").is_some());
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed_verbatim() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(409)
                .insert_header("content-type", "application/json")
                .set_body_string("{\"error\":\"conflict\"}"),
        )
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request("GET", "/proxies/v8/items/7", "k12", ""))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_text(response).await, "{\"error\":\"conflict\"}");
}

#[tokio::test]
async fn test_transport_failure_returns_500() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let service = service(&config(&format!("http://127.0.0.1:{port}")));

    let response = service
        .call(request("GET", "/proxies/v8/items/7", "k12", ""))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_path_outside_mount_is_404() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let response = service
        .call(request("GET", "/proxies/v80/items", "k12", ""))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let mut config = config(&upstream.uri());
    config.gateway.max_request_body_size = 8;
    let service = service(&config);

    let response = service
        .call(request(
            "POST",
            "/proxies/v8/items",
            "k12",
            "{\"payload\":\"far too long\"}",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_slow_upstream_yields_single_503() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(1500)),
        )
        .mount(&upstream)
        .await;

    let mut config = config(&upstream.uri());
    config.gateway.request_timeout = Duration::from_millis(200);
    let service = service(&config);

    let response = service
        .call(request("GET", "/proxies/v8/items/7", "k12", ""))
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(response).await, "Response timeout");
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-request-id", "trace-42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let service = service(&config(&upstream.uri()));
    let mut req = request("GET", "/proxies/v8/items/7", "k12", "");
    req.headers_mut()
        .insert("x-request-id", "trace-42".parse().unwrap());
    let response = service.call(req).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-42");
}

#[tokio::test]
async fn test_healthcheck_is_served_locally() {
    let upstream = MockServer::start().await;
    let service = service(&config(&upstream.uri()));

    let response = service
        .call(
            Request::builder()
                .uri("/healthcheck")
                .body(Full::new(Bytes::new()))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["everything"], "is ok");
}

#[tokio::test]
async fn test_readiness_follows_ready_flag() {
    let upstream = MockServer::start().await;
    let service = service(&config(&upstream.uri()));
    let ready = || {
        Request::builder()
            .uri("/_hermes/ready")
            .body(Full::new(Bytes::new()))
            .unwrap()
    };

    assert_eq!(
        service.call(ready()).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
    service.health().set_ready(true);
    assert_eq!(service.call(ready()).await.status(), StatusCode::OK);
}
