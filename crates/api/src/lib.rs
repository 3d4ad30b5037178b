// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Campus API Library
//!
//! HTTP surface for the campus platform: tenant resolution per request,
//! tenant-scoped payment routes and the payment provider webhook.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod tenancy;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
pub use tenancy::TenantContext;
