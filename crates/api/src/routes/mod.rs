//! API routes

pub mod health;
pub mod payments;
pub mod tenant;
pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::tenancy::{require_site_access, require_tenant, resolve_tenant};

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // Tenant-required routes; require_tenant is the outer layer
    let tenant_routes = Router::new()
        .route("/payments/initialize", post(payments::initialize_checkout))
        .route("/payments/{reference}", get(payments::get_payment))
        .route(
            "/students/{student_id}/payments",
            get(payments::list_student_payments),
        )
        .layer(middleware::from_fn(require_site_access))
        .layer(middleware::from_fn(require_tenant));

    let resolved_routes = Router::new()
        .route("/api/tenant", get(tenant::current_tenant))
        .nest("/api/t", tenant_routes)
        .layer(middleware::from_fn_with_state(state.clone(), resolve_tenant));

    // Webhooks arrive on the platform host and route by payload metadata
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/webhooks/payments", post(webhooks::payment_webhook));

    Router::new()
        .merge(public_routes)
        .merge(resolved_routes)
        .with_state(state)
}
