//! Per-request pipeline: identity, classification, authorization, forwarding.

use std::sync::Arc;

use bytes::Bytes;
use hermes_core::{
    classify, strip_mount_prefix, AuthorizationDecision, AuthorizationPolicy, CallerIdentity,
    ClassifiedOperation, QueryParams,
};
use http::{Request, Uri};
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::headers::{forwarded_headers, IdentityHeaders};
use crate::proxy::{UpstreamClient, UpstreamRequest, UpstreamResponse};
use crate::session::{extract_identity, SessionResolver};

/// Wires the request stages together for one inbound request.
///
/// Holds only shared, read-only state.
#[derive(Debug, Clone)]
pub struct GatewayPipeline {
    policy: Arc<AuthorizationPolicy>,
    upstream: Arc<UpstreamClient>,
    resolver: Arc<dyn SessionResolver>,
    service_credential: String,
    mount_prefix: String,
}

impl GatewayPipeline {
    /// Create a pipeline.
    pub fn new(
        policy: Arc<AuthorizationPolicy>,
        upstream: Arc<UpstreamClient>,
        resolver: Arc<dyn SessionResolver>,
        service_credential: impl Into<String>,
        mount_prefix: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            upstream,
            resolver,
            service_credential: service_credential.into(),
            mount_prefix: mount_prefix.into(),
        }
    }

    /// Returns `true` if `path` falls under the mount prefix.
    pub fn is_mounted(&self, path: &str) -> bool {
        let prefix = self.mount_prefix.as_str();
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The request target with the mount prefix removed.
    pub fn upstream_target(&self, uri: &Uri) -> String {
        let path = strip_mount_prefix(&self.mount_prefix, uri.path());
        match uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        }
    }

    /// Classify the request target.
    pub fn classify(&self, uri: &Uri) -> ClassifiedOperation {
        let path = strip_mount_prefix(&self.mount_prefix, uri.path());
        classify(path, &QueryParams::parse(uri.query()))
    }

    /// Authorize and forward one buffered request.
    ///
    /// A denial returns [`GatewayError::AuthorizationDenied`] without contacting
    /// the upstream.
    pub async fn handle(
        &self,
        operation: &ClassifiedOperation,
        request: Request<Bytes>,
        request_id: &str,
    ) -> GatewayResult<UpstreamResponse> {
        let (parts, body) = request.into_parts();
        let identity = extract_identity(&parts, self.resolver.as_ref());
        debug!(
            operation = %operation.kind(),
            resource_id = operation.resource_id().unwrap_or(""),
            "classified"
        );

        self.authorize(operation, &identity)?;

        let mut headers = forwarded_headers(&parts.headers);
        IdentityHeaders::new(&self.service_credential, &identity, request_id)
            .add_to_headers(&mut headers);

        let upstream_request = UpstreamRequest::build(
            self.upstream.base_url(),
            &self.upstream_target(&parts.uri),
            parts.method,
            headers,
            body,
        );
        debug!(url = %upstream_request.url, "forwarding");

        self.upstream.forward(upstream_request).await.map_err(|e| {
            hermes_telemetry::record_upstream_failure();
            warn!(error = %e, "upstream call failed");
            e
        })
    }

    fn authorize(
        &self,
        operation: &ClassifiedOperation,
        identity: &CallerIdentity,
    ) -> GatewayResult<()> {
        if !operation.is_sensitive() {
            return Ok(());
        }

        let kind = operation.kind().as_str();
        let resource_id = operation.resource_id().unwrap_or("");

        match self.policy.authorize(operation, identity) {
            AuthorizationDecision::Allow => {
                hermes_telemetry::record_authz_decision(kind, true, "allowed");
                info!(
                    operation = kind,
                    resource_id,
                    caller = %identity.log_id(),
                    tenant = %identity.tenant_id,
                    "authorization allowed"
                );
                Ok(())
            }
            AuthorizationDecision::Deny(reason) => {
                hermes_telemetry::record_authz_decision(kind, false, reason.as_str());
                warn!(
                    operation = kind,
                    resource_id,
                    caller = %identity.log_id(),
                    tenant = %identity.tenant_id,
                    reason = reason.as_str(),
                    "authorization denied"
                );
                Err(GatewayError::authorization_denied(reason))
            }
        }
    }
}
