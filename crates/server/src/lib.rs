//! HTTP host for courier.
//!
//! Exposes the public write endpoints (rate limited), the bearer-protected
//! trigger endpoints that drive dispatch, cleanup and drip sequences, and a
//! read-only job view for operators.

pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, Quotas, build_registry};
