//! Header handling between the client, the gateway and the upstream.
//!
//! Only an explicit allow-list of inbound headers reaches the upstream. Cookies,
//! inbound credentials and the session headers written by the authentication
//! layer are never forwarded. The identity headers are always rebuilt from the
//! resolved caller.

use hermes_core::CallerIdentity;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing::warn;
use uuid::Uuid;

/// Header name for request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Header name for the caller's user id.
pub static HEADER_USER_ID: HeaderName = HeaderName::from_static("x-authenticated-user-id");

/// Header name for the caller's root organisation.
pub static HEADER_USER_ORGID: HeaderName = HeaderName::from_static("x-authenticated-user-orgid");

/// Header name for the caller's auth token.
pub static HEADER_USER_TOKEN: HeaderName = HeaderName::from_static("x-authenticated-user-token");

/// Inbound headers copied to the upstream request.
pub static FORWARDED_REQUEST_HEADERS: &[&str] = &["content-type", "accept", "accept-language"];

const MAX_REQUEST_ID_LEN: usize = 128;

/// Identity headers attached to every upstream request.
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    /// Static service credential sent as `Authorization`.
    pub service_credential: String,
    /// Caller user id.
    pub user_id: String,
    /// Caller root organisation.
    pub tenant_id: String,
    /// Caller auth token.
    pub auth_token: String,
    /// Request ID for correlation.
    pub request_id: String,
}

impl IdentityHeaders {
    /// Build the identity headers for `identity`.
    pub fn new(service_credential: &str, identity: &CallerIdentity, request_id: &str) -> Self {
        Self {
            service_credential: service_credential.to_string(),
            user_id: identity.user_id.clone(),
            tenant_id: identity.tenant_id.clone(),
            auth_token: identity.auth_token.clone(),
            request_id: request_id.to_string(),
        }
    }

    /// Add the identity headers to a header map.
    ///
    /// Empty fields are omitted. Values that are not valid header values are
    /// skipped with a warning.
    pub fn add_to_headers(&self, headers: &mut HeaderMap) {
        insert_value(headers, &AUTHORIZATION, &self.service_credential, true);
        insert_value(headers, &HEADER_USER_ID, &self.user_id, false);
        insert_value(headers, &HEADER_USER_ORGID, &self.tenant_id, false);
        insert_value(headers, &HEADER_USER_TOKEN, &self.auth_token, true);
        insert_value(headers, &HEADER_REQUEST_ID, &self.request_id, false);
    }
}

fn insert_value(headers: &mut HeaderMap, name: &HeaderName, value: &str, sensitive: bool) {
    if value.is_empty() {
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(mut value) => {
            value.set_sensitive(sensitive);
            headers.insert(name.clone(), value);
        }
        Err(_) => warn!(header = %name, "skipping identity header with invalid value"),
    }
}

/// Copy the allow-listed inbound headers.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for name in FORWARDED_REQUEST_HEADERS {
        for value in inbound.get_all(*name) {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                forwarded.append(name, value.clone());
            }
        }
    }
    forwarded
}

/// Reuse a well-formed inbound `x-request-id`, or mint a UUIDv7.
pub fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(&HEADER_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::now_v7().to_string(), String::from)
}
