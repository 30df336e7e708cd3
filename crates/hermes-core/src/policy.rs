//! Authorization decisions for sensitive operations.

use std::collections::HashSet;
use std::fmt;

use crate::identity::{parse_role_list, CallerIdentity};
use crate::route::ClassifiedOperation;

/// Why a sensitive operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The identifier names a master category and the caller holds none of
    /// the privileged roles.
    MissingPrivilegedRole,
    /// The identifier does not match the caller's tenant.
    TenantMismatch,
}

impl DenyReason {
    /// Plain-text message returned to the client.
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingPrivilegedRole => {
                "User does not have the required role to update the framework"
            }
            Self::TenantMismatch => "orgId does not match rootOrgId",
        }
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingPrivilegedRole => "missing_privileged_role",
            Self::TenantMismatch => "tenant_mismatch",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of gating an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// Forward the request.
    Allow,
    /// Refuse with a fixed reason.
    Deny(DenyReason),
}

impl AuthorizationDecision {
    /// Returns `true` for [`AuthorizationDecision::Allow`].
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Process-wide authorization settings.
///
/// Built once at startup and shared read-only between request handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    master_category_ids: HashSet<String>,
    privileged_roles: HashSet<String>,
}

impl AuthorizationPolicy {
    /// Creates a policy from the master category ids and privileged roles.
    pub fn new<I, R>(master_category_ids: I, privileged_roles: R) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            master_category_ids: master_category_ids.into_iter().map(Into::into).collect(),
            privileged_roles: privileged_roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a policy from two comma-separated lists.
    pub fn from_comma_lists(master_category_ids: &str, privileged_roles: &str) -> Self {
        Self::new(
            parse_role_list(master_category_ids),
            parse_role_list(privileged_roles),
        )
    }

    /// Identifiers of the shared master categories.
    pub fn master_category_ids(&self) -> &HashSet<String> {
        &self.master_category_ids
    }

    /// Roles allowed to modify master categories.
    pub fn privileged_roles(&self) -> &HashSet<String> {
        &self.privileged_roles
    }

    /// Decides whether `identity` may act on the resource `id`.
    ///
    /// Numeric identifiers listed as master categories require a privileged
    /// role. Every other identifier must equal the caller's tenant. No
    /// identifier means no constraint applies.
    pub fn decide(&self, id: Option<&str>, identity: &CallerIdentity) -> AuthorizationDecision {
        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return AuthorizationDecision::Allow;
        };

        if is_numeric(id) && self.master_category_ids.contains(id) {
            return if identity.has_any_role(&self.privileged_roles) {
                AuthorizationDecision::Allow
            } else {
                AuthorizationDecision::Deny(DenyReason::MissingPrivilegedRole)
            };
        }

        if id == identity.tenant_id {
            AuthorizationDecision::Allow
        } else {
            AuthorizationDecision::Deny(DenyReason::TenantMismatch)
        }
    }

    /// Gates a classified operation. Generic operations are always allowed.
    pub fn authorize(
        &self,
        operation: &ClassifiedOperation,
        identity: &CallerIdentity,
    ) -> AuthorizationDecision {
        if operation.is_sensitive() {
            self.decide(operation.resource_id(), identity)
        } else {
            AuthorizationDecision::Allow
        }
    }
}

/// Returns `true` if `value` is an optionally signed run of ASCII digits.
pub fn is_numeric(value: &str) -> bool {
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SessionContext;

    fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::from_comma_lists("1, 2", "ORG_ADMIN")
    }

    fn caller(tenant: &str, roles: &[&str]) -> CallerIdentity {
        CallerIdentity::from_session(Some(&SessionContext {
            user_id: Some("u-1".to_string()),
            tenant_id: Some(tenant.to_string()),
            roles: roles.iter().map(ToString::to_string).collect(),
            ..SessionContext::default()
        }))
    }

    #[test]
    fn test_absent_id_allows() {
        let anon = CallerIdentity::anonymous();
        assert_eq!(policy().decide(None, &anon), AuthorizationDecision::Allow);
        assert_eq!(policy().decide(Some(""), &anon), AuthorizationDecision::Allow);
    }

    #[test]
    fn test_master_category_requires_privileged_role() {
        let p = policy();
        assert_eq!(
            p.decide(Some("1"), &caller("x", &["ORG_ADMIN"])),
            AuthorizationDecision::Allow
        );
        assert_eq!(
            p.decide(Some("1"), &caller("1", &["VIEWER"])),
            AuthorizationDecision::Deny(DenyReason::MissingPrivilegedRole)
        );
    }

    #[test]
    fn test_numeric_non_master_uses_tenant_equality() {
        let p = policy();
        assert_eq!(
            p.decide(Some("55"), &caller("55", &[])),
            AuthorizationDecision::Allow
        );
        assert_eq!(
            p.decide(Some("55"), &caller("56", &["ORG_ADMIN"])),
            AuthorizationDecision::Deny(DenyReason::TenantMismatch)
        );
    }

    #[test]
    fn test_non_numeric_uses_tenant_equality() {
        let p = policy();
        assert!(p.decide(Some("k12"), &caller("k12", &[])).is_allowed());
        assert_eq!(
            p.decide(Some("k12"), &caller("other", &[])),
            AuthorizationDecision::Deny(DenyReason::TenantMismatch)
        );
    }

    #[test]
    fn test_anonymous_caller_denied_for_any_id() {
        let anon = CallerIdentity::anonymous();
        assert!(!policy().decide(Some("1"), &anon).is_allowed());
        assert!(!policy().decide(Some("k12"), &anon).is_allowed());
    }

    #[test]
    fn test_generic_is_never_gated() {
        let anon = CallerIdentity::anonymous();
        assert!(policy()
            .authorize(&ClassifiedOperation::Generic, &anon)
            .is_allowed());
    }

    #[test]
    fn test_authorize_uses_resource_id() {
        let op = ClassifiedOperation::Update(Some("k12".to_string()));
        assert!(policy().authorize(&op, &caller("k12", &[])).is_allowed());
        assert!(!policy().authorize(&op, &caller("other", &[])).is_allowed());
    }

    #[test]
    fn test_framework_with_empty_prefix_is_tenant_checked() {
        for target in [
            "/framework/v1/update/x?framework=_other",
            "/framework/v1/update/x?framework=_1",
            "/framework/v1/create/x?framework=_",
        ] {
            let op = crate::route::classify_path_and_query(target);
            assert_eq!(
                policy().authorize(&op, &caller("k12", &["ORG_ADMIN"])),
                AuthorizationDecision::Deny(DenyReason::TenantMismatch),
                "{target}"
            );
        }
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("42"));
        assert!(is_numeric("-7"));
        assert!(is_numeric("+0012"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("-"));
        assert!(!is_numeric("12a"));
        assert!(!is_numeric("1.5"));
        assert!(!is_numeric(" 1"));
    }

    #[test]
    fn test_from_comma_lists_trims() {
        let p = policy();
        assert!(p.master_category_ids().contains("2"));
        assert_eq!(p.master_category_ids().len(), 2);
        assert!(p.privileged_roles().contains("ORG_ADMIN"));
    }

    #[test]
    fn test_deny_messages() {
        assert_eq!(
            DenyReason::TenantMismatch.to_string(),
            "orgId does not match rootOrgId"
        );
        assert_eq!(
            DenyReason::MissingPrivilegedRole.message(),
            "User does not have the required role to update the framework"
        );
    }
}
