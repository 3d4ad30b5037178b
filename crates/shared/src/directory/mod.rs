//! Tenant directory: the durable registry of tenants
//!
//! Maps tenant ids and routing slugs to status and restriction flags. The
//! resolver produces slugs; this registry decides whether a slug names an
//! active tenant.

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::models::{NewTenant, Restriction, Tenant, TenantId, TenantSlug};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTenantDirectory;
pub use postgres::PgTenantDirectory;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_slug(&self, slug: &TenantSlug) -> DirectoryResult<Option<Tenant>>;
    async fn find_by_id(&self, id: TenantId) -> DirectoryResult<Option<Tenant>>;
    async fn list_active(&self) -> DirectoryResult<Vec<Tenant>>;

    /// Create a tenant in `pending`
    async fn register(&self, tenant: NewTenant) -> DirectoryResult<Tenant>;
    /// `pending` -> `active`
    async fn activate(&self, id: TenantId) -> DirectoryResult<Tenant>;
    /// `pending` -> `declined`, terminal
    async fn decline(&self, id: TenantId, reason: &str) -> DirectoryResult<Tenant>;
    async fn set_restrictions(
        &self,
        id: TenantId,
        login: Restriction,
        site: Restriction,
    ) -> DirectoryResult<Tenant>;
    /// Remove the registry row; tenant data is purged by the lifecycle service first
    async fn remove(&self, id: TenantId) -> DirectoryResult<()>;

    fn backend_name(&self) -> &'static str;
}

/// Look up a slug and keep it only if the tenant may receive traffic
pub async fn find_resolvable(
    directory: &dyn TenantDirectory,
    slug: &TenantSlug,
) -> DirectoryResult<Option<Tenant>> {
    Ok(directory
        .find_by_slug(slug)
        .await?
        .filter(Tenant::is_resolvable))
}
