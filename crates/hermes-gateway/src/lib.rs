//! Hermes Gateway - authenticated reverse proxy
//!
//! Hermes sits between authenticated clients and a backend API gateway. It
//! reads the caller's session, decides whether a sensitive operation is
//! allowed, attaches the caller's identity as upstream headers and relays the
//! upstream response verbatim.
//!
//! # Architecture
//!
//! ```text
//!  client ──► auth layer ──► Hermes ─────────────────────────► upstream API
//!             (session)      │ 1. resolve caller identity
//!                            │ 2. classify path + query
//!                            │ 3. authorize (publish/create/update)
//!                            │ 4. inject identity headers
//!                            └ 5. relay status + body
//! ```
//!
//! # Session source
//!
//! Behind an authentication layer that writes the `x-session-*` headers, set
//! `session.trust_headers` (or `HERMES_GATEWAY_TRUST_SESSION_HEADERS=true`).
//! That layer must strip any client-supplied copies of those headers. Without
//! the setting the headers are ignored and callers are anonymous unless a
//! [`hermes_core::SessionContext`] is attached in process.
//!
//! # Example Usage
//!
//! ```bash
//! # Run with a configuration file
//! $ hermes-gateway --config /etc/hermes/gateway.toml
//!
//! # Run with environment variable overrides
//! $ HERMES_GATEWAY_UPSTREAM_URL=http://kong:8000 \
//!   HERMES_GATEWAY_MASTER_CATEGORY_IDS=1,2 \
//!   HERMES_GATEWAY_TRUST_SESSION_HEADERS=true \
//!   hermes-gateway
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-gateway/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod headers;
pub mod health;
pub mod pipeline;
pub mod proxy;
pub mod server;
pub mod session;

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use error::{GatewayError, GatewayResult};
pub use health::{HealthChecker, HealthResponse, ReadinessStatus};
pub use pipeline::GatewayPipeline;
pub use proxy::{UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use server::{GatewayServer, GatewayService};
pub use session::{ExtensionSessionResolver, HeaderSessionResolver, SessionResolver};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
