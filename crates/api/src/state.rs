//! Application state

use std::sync::Arc;

use campus_billing::{BillingResult, BillingService};
use campus_shared::{
    CacheBackend, PgTenantDirectory, PgTenantStore, ScopeManager, TenantDirectory, TenantResolver,
    TenantStore,
};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    pub directory: Arc<dyn TenantDirectory>,
    pub scopes: ScopeManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    /// Postgres-backed state for the server binary
    pub fn new(config: &Config, pool: PgPool, cache: Arc<dyn CacheBackend>) -> BillingResult<Self> {
        let directory: Arc<dyn TenantDirectory> = Arc::new(PgTenantDirectory::new(pool.clone()));
        let store: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(pool));
        let scopes = ScopeManager::new(store, cache);
        let billing = BillingService::new(&config.billing, directory.clone(), scopes.clone())?;

        Ok(Self::from_parts(
            TenantResolver::new(&config.tenant_base_domains),
            directory,
            scopes,
            billing,
        ))
    }

    pub fn from_parts(
        resolver: TenantResolver,
        directory: Arc<dyn TenantDirectory>,
        scopes: ScopeManager,
        billing: BillingService,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            directory,
            scopes,
            billing: Arc::new(billing),
        }
    }
}
