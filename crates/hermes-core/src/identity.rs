//! Caller identity.
//!
//! The authentication layer in front of the gateway establishes a session and
//! hands it over as a [`SessionContext`]. Any of its fields may be missing, so
//! [`CallerIdentity::from_session`] normalises it once, at the boundary, into
//! a value with defined fallbacks. Downstream code never sees an `Option`.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Session established by the authentication collaborator.
///
/// Every field is optional because the session store may not have populated
/// it (expired grant, partially provisioned user, unauthenticated call).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionContext {
    /// Authenticated user id.
    pub user_id: Option<String>,
    /// Access token issued to the user.
    pub auth_token: Option<String>,
    /// Root organisation (tenant) of the user.
    #[serde(alias = "rootOrgId")]
    pub tenant_id: Option<String>,
    /// Role names granted to the user. Order is irrelevant.
    #[serde(alias = "userRoles")]
    pub roles: Vec<String>,
}

/// Normalised identity of the caller.
///
/// Absent session fields resolve to empty values. An empty identity holds no
/// roles and an empty tenant, so it fails any privileged check and any tenant
/// comparison against a non-empty identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// User id, empty when unknown.
    pub user_id: String,
    /// Auth token, empty when unknown.
    pub auth_token: String,
    /// Tenant (root organisation) id, empty when unknown.
    pub tenant_id: String,
    /// Granted role names.
    pub roles: BTreeSet<String>,
}

impl CallerIdentity {
    /// Derives the caller identity from an optional session. Never fails.
    pub fn from_session(session: Option<&SessionContext>) -> Self {
        let Some(session) = session else {
            return Self::anonymous();
        };

        Self {
            user_id: session.user_id.clone().unwrap_or_default(),
            auth_token: session.auth_token.clone().unwrap_or_default(),
            tenant_id: session.tenant_id.clone().unwrap_or_default(),
            roles: session
                .roles
                .iter()
                .map(|role| role.trim())
                .filter(|role| !role.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// The fully empty identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Returns `true` if the caller holds at least one of `roles`.
    pub fn has_any_role(&self, roles: &HashSet<String>) -> bool {
        self.roles.iter().any(|role| roles.contains(role))
    }

    /// Returns `true` when no user id is known.
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_empty()
    }

    /// Identifier suitable for logs. Never includes the token.
    pub fn log_id(&self) -> String {
        if self.is_anonymous() {
            "anonymous".to_string()
        } else {
            format!("user:{}", self.user_id)
        }
    }
}

/// Splits a comma-separated role list, trimming entries and dropping blanks.
pub fn parse_role_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(String::from)
        .collect()
}
