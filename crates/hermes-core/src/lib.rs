//! # Hermes Core
//!
//! Request semantics for the Hermes authenticated gateway.
//!
//! Everything in this crate is a pure function of the request line, the
//! caller's session and the process-wide [`AuthorizationPolicy`]. There is no
//! I/O and no state shared between requests, so every type here can be used
//! from any number of concurrent request handlers.
//!
//! - [`CallerIdentity`] - normalised caller identity derived from a [`SessionContext`]
//! - [`ClassifiedOperation`] - what a forwarded URL asks the upstream to do
//! - [`AuthorizationPolicy`] - master-category and privileged-role allow-lists
//! - [`AuthorizationDecision`] - the outcome of gating a sensitive operation
//!
//! # Example
//!
//! ```
//! use hermes_core::{
//!     classify_path_and_query, AuthorizationDecision, AuthorizationPolicy, CallerIdentity,
//!     SessionContext,
//! };
//!
//! let policy = AuthorizationPolicy::from_comma_lists("1,2", "ORG_ADMIN");
//! let session = SessionContext {
//!     tenant_id: Some("k12".to_string()),
//!     ..SessionContext::default()
//! };
//! let caller = CallerIdentity::from_session(Some(&session));
//!
//! let operation = classify_path_and_query("/framework/v1/update/x?framework=k12_v2");
//! assert_eq!(operation.resource_id(), Some("k12"));
//! assert_eq!(policy.authorize(&operation, &caller), AuthorizationDecision::Allow);
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod identity;
mod policy;
pub mod route;

pub use identity::{parse_role_list, CallerIdentity, SessionContext};
pub use policy::{is_numeric, AuthorizationDecision, AuthorizationPolicy, DenyReason};
pub use route::{
    classify, classify_path_and_query, strip_mount_prefix, ClassifiedOperation, OperationKind,
    QueryParams,
};
