//! FinanceHub edge gateway: gates the `/financehub` application and its API
//! behind an identity and subscription check before anything reaches the origin.
//!
//! Each request is classified by path, and only enforced paths pay for the
//! token extraction and the single upstream entitlement check. The outcome is
//! one of four terminal decisions: forward (with `X-User-ID` / `X-User-Plan`
//! injected when verified), or a redirect to login, pricing or the error page.
//!
//! # Modules
//!
//! - [`rules`]: protected-zone patterns and public exceptions
//! - [`credentials`]: bearer token from `Authorization` or session cookies
//! - [`verifier`]: entitlement-check client returning a typed `Result`
//! - [`decision`]: the per-request state machine and redirect framing
//! - [`forward`]: relays the request to the origin and its response back
//! - [`routes`]: actix-web handlers (catch-all gateway, health, metrics)

pub mod config;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod routes;
pub mod rules;
pub mod state;
pub mod verifier;

pub use config::GatewayConfig;
pub use decision::GatewayDecision;
pub use error::GatewayError;
pub use state::AppState;
