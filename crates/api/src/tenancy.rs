//! Request tenancy: resolution, scope binding and access gates
//!
//! `resolve_tenant` runs on every tenant-facing route. It binds the scope of
//! an active tenant for the remainder of the request; anything else leaves
//! the request in the unbound central scope. The gates below it turn a
//! missing or restricted tenant into a fixed response.

use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use campus_shared::resolver::{TENANT_HEADER, TENANT_QUERY_PARAM};
use campus_shared::{current_scope, find_resolvable, RequestIdentity, TenantScope};

use crate::{error::ApiError, state::AppState};

/// Pull the override header, override query parameter and host off a request
pub fn request_identity(request: &Request) -> RequestIdentity {
    let override_header = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let override_query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove(TENANT_QUERY_PARAM));

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string));

    RequestIdentity {
        override_header,
        override_query,
        host,
    }
}

/// Bind the request's tenant scope when it names an active tenant
pub async fn resolve_tenant(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let identity = request_identity(&request);
    let Some((slug, source)) = state.resolver.resolve_with_source(&identity) else {
        return next.run(request).await;
    };

    let tenant = match find_resolvable(state.directory.as_ref(), &slug).await {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            tracing::debug!(slug = %slug, source = ?source, "No active tenant for slug");
            return next.run(request).await;
        }
        Err(e) => {
            tracing::warn!(slug = %slug, error = %e, "Tenant lookup failed; continuing unresolved");
            return next.run(request).await;
        }
    };

    tracing::debug!(tenant_id = %tenant.id, slug = %slug, source = ?source, "Tenant resolved");
    match state.scopes.run(&tenant, next.run(request)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(tenant_id = %tenant.id, error = %e, "Failed to bind tenant scope");
            ApiError::from(e).into_response()
        }
    }
}

/// Refuse requests that reached a tenant route without a bound tenant
pub async fn require_tenant(request: Request, next: Next) -> Response {
    if current_scope().is_err() {
        return ApiError::TenantNotFound.into_response();
    }
    next.run(request).await
}

/// Refuse requests for a tenant whose site is blocked
pub async fn require_site_access(request: Request, next: Next) -> Response {
    match current_scope() {
        Ok(scope) if scope.tenant().is_site_blocked() => {
            tracing::info!(tenant_id = %scope.tenant_id(), "Request refused: site restricted");
            ApiError::SiteRestricted {
                reason: scope.tenant().site_restriction.reason.clone(),
            }
            .into_response()
        }
        Ok(_) => next.run(request).await,
        Err(_) => ApiError::TenantNotFound.into_response(),
    }
}

/// The tenant scope bound to this request
#[derive(Debug, Clone)]
pub struct TenantContext(pub TenantScope);

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_scope()
            .map(TenantContext)
            .map_err(|_| ApiError::TenantNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_identity_reads_header_query_and_host() {
        let request = Request::builder()
            .uri("/api/tenant?tenant=riverside&page=2")
            .header("x-tenant", "greenwood")
            .header("host", "hillcrest.campus.app:8080")
            .body(Body::empty())
            .unwrap();

        let identity = request_identity(&request);
        assert_eq!(identity.override_header.as_deref(), Some("greenwood"));
        assert_eq!(identity.override_query.as_deref(), Some("riverside"));
        assert_eq!(identity.host.as_deref(), Some("hillcrest.campus.app:8080"));
    }

    #[test]
    fn test_identity_falls_back_to_uri_host() {
        let request = Request::builder()
            .uri("http://greenwood.campus.test/api/tenant")
            .body(Body::empty())
            .unwrap();

        let identity = request_identity(&request);
        assert_eq!(identity.override_header, None);
        assert_eq!(identity.override_query, None);
        assert_eq!(identity.host.as_deref(), Some("greenwood.campus.test"));
    }
}
