//! Session resolution at the HTTP boundary.
//!
//! The gateway runs behind an authentication layer that owns cookies, SSO and
//! the session store. That layer hands the established session over either as
//! a [`SessionContext`] request extension (in-process embedding) or as trusted
//! headers (sidecar deployment). Either way, resolution never fails: a caller
//! without a session is the anonymous identity.
//!
//! Session headers are only read when [`SessionSettings::trust_headers`] is
//! set. The gateway cannot tell headers written by the authentication layer
//! from headers sent by the client, so that layer must strip or overwrite
//! them on every request.

use std::fmt;
use std::sync::Arc;

use hermes_core::{parse_role_list, CallerIdentity, SessionContext};
use http::request::Parts;
use http::HeaderName;

use crate::config::SessionSettings;
use crate::error::{GatewayError, GatewayResult};

/// Source of the caller's session.
pub trait SessionResolver: Send + Sync + fmt::Debug {
    /// Return the session attached to the request, if any.
    fn resolve(&self, parts: &Parts) -> Option<SessionContext>;
}

/// Reads the session from headers written by the authentication layer.
#[derive(Debug, Clone)]
pub struct HeaderSessionResolver {
    user_id: HeaderName,
    auth_token: HeaderName,
    tenant_id: HeaderName,
    roles: HeaderName,
}

impl HeaderSessionResolver {
    /// Create a resolver from the configured header names.
    pub fn new(settings: &SessionSettings) -> GatewayResult<Self> {
        Ok(Self {
            user_id: header_name(&settings.user_id_header)?,
            auth_token: header_name(&settings.auth_token_header)?,
            tenant_id: header_name(&settings.tenant_id_header)?,
            roles: header_name(&settings.roles_header)?,
        })
    }

    fn value(parts: &Parts, name: &HeaderName) -> Option<String> {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    }
}

impl SessionResolver for HeaderSessionResolver {
    fn resolve(&self, parts: &Parts) -> Option<SessionContext> {
        let session = SessionContext {
            user_id: Self::value(parts, &self.user_id),
            auth_token: Self::value(parts, &self.auth_token),
            tenant_id: Self::value(parts, &self.tenant_id),
            roles: Self::value(parts, &self.roles)
                .map(|raw| parse_role_list(&raw))
                .unwrap_or_default(),
        };

        (session != SessionContext::default()).then_some(session)
    }
}

/// Ignores request headers entirely. Only a [`SessionContext`] extension
/// identifies the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionSessionResolver;

impl SessionResolver for ExtensionSessionResolver {
    fn resolve(&self, _parts: &Parts) -> Option<SessionContext> {
        None
    }
}

/// Build the resolver selected by `settings`.
pub fn resolver_for(settings: &SessionSettings) -> GatewayResult<Arc<dyn SessionResolver>> {
    if settings.trust_headers {
        Ok(Arc::new(HeaderSessionResolver::new(settings)?))
    } else {
        Ok(Arc::new(ExtensionSessionResolver))
    }
}

fn header_name(name: &str) -> GatewayResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| GatewayError::config(format!("invalid session header: {name}")))
}

/// Derive the caller identity for a request.
///
/// A [`SessionContext`] already present in the request extensions takes
/// precedence over `resolver`.
pub fn extract_identity(parts: &Parts, resolver: &dyn SessionResolver) -> CallerIdentity {
    if let Some(session) = parts.extensions.get::<SessionContext>() {
        return CallerIdentity::from_session(Some(session));
    }
    CallerIdentity::from_session(resolver.resolve(parts).as_ref())
}
