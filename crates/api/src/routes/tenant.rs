//! Tenant resolution endpoint

use axum::Json;
use campus_shared::{current_scope, Tenant, TenantId};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResolvedTenant {
    pub id: TenantId,
    pub slug: String,
    pub name: String,
    pub status: &'static str,
    pub login_blocked: bool,
    pub login_block_reason: Option<String>,
    pub site_blocked: bool,
    pub site_block_reason: Option<String>,
}

impl From<&Tenant> for ResolvedTenant {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id,
            slug: tenant.slug.to_string(),
            name: tenant.name.clone(),
            status: tenant.status.as_str(),
            login_blocked: tenant.login_restriction.blocked,
            login_block_reason: tenant.login_restriction.reason.clone(),
            site_blocked: tenant.site_restriction.blocked,
            site_block_reason: tenant.site_restriction.reason.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub tenant: Option<ResolvedTenant>,
}

/// The tenant this request resolved to, or `null`.
///
/// Reachable for site-blocked tenants so clients can show the reason.
pub async fn current_tenant() -> Json<TenantResponse> {
    let tenant = current_scope()
        .ok()
        .map(|scope| ResolvedTenant::from(scope.tenant()));
    Json(TenantResponse { tenant })
}
