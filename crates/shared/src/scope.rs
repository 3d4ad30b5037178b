//! Tenant scope binding
//!
//! A scope is the tenant an execution (one request, one job) is running for,
//! together with the data and cache handles bound to it. It lives in a tokio
//! task-local slot: concurrent tasks each see their own slot, and there is no
//! process-wide "current tenant" to leak between requests.
//!
//! ```text
//! Unbound --enter_scope--> Bound(tenant) --guard dropped--> Unbound
//!                 \--already bound--> AlreadyBound (slot untouched)
//! ```
//!
//! The slot is cleared by `ScopeGuard::drop`, so every exit path (normal
//! return, `?`, panic unwinding) restores the unbound state.

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{CacheBackend, TenantCache};
use crate::error::ScopeError;
use crate::models::{Tenant, TenantId};
use crate::store::{TenantDb, TenantStore};

tokio::task_local! {
    static SCOPE_SLOT: RefCell<Option<TenantScope>>;
}

/// Per-execution tenant handle
#[derive(Clone, Debug)]
pub struct TenantScope {
    tenant: Tenant,
    db: TenantDb,
    cache: TenantCache,
}

impl TenantScope {
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.id
    }

    pub fn db(&self) -> &TenantDb {
        &self.db
    }

    pub fn cache(&self) -> &TenantCache {
        &self.cache
    }
}

/// Clears the bound scope when dropped
#[must_use = "the scope is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    tenant: TenantId,
}

impl ScopeGuard {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        // Outside the owning context there is nothing to restore
        let _ = SCOPE_SLOT.try_with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                slot.take();
            }
        });
        tracing::trace!(tenant_id = %self.tenant, "Tenant scope released");
    }
}

/// Builds and binds tenant scopes
#[derive(Clone)]
pub struct ScopeManager {
    store: Arc<dyn TenantStore>,
    cache: Arc<dyn CacheBackend>,
}

impl ScopeManager {
    pub fn new(store: Arc<dyn TenantStore>, cache: Arc<dyn CacheBackend>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> Arc<dyn TenantStore> {
        self.store.clone()
    }

    pub fn cache_backend(&self) -> Arc<dyn CacheBackend> {
        self.cache.clone()
    }

    /// Scope for `tenant` without binding it
    pub fn build_scope(&self, tenant: &Tenant) -> TenantScope {
        TenantScope {
            tenant: tenant.clone(),
            db: TenantDb::new(tenant.id, self.store.clone()),
            cache: TenantCache::new(tenant.id, self.cache.clone()),
        }
    }

    /// Bind `tenant` to the current execution context.
    ///
    /// Must be called inside `run` or `scoped_context`. Fails with
    /// `AlreadyBound` instead of replacing an existing binding.
    pub fn enter_scope(&self, tenant: &Tenant) -> Result<ScopeGuard, ScopeError> {
        if !tenant.is_resolvable() {
            return Err(ScopeError::Inactive(tenant.id));
        }
        let scope = self.build_scope(tenant);

        SCOPE_SLOT
            .try_with(|slot| {
                let mut slot = slot.borrow_mut();
                if let Some(active) = slot.as_ref() {
                    return Err(ScopeError::AlreadyBound {
                        active: active.tenant_id(),
                        requested: tenant.id,
                    });
                }
                *slot = Some(scope);
                Ok(())
            })
            .map_err(|_| ScopeError::NoContext)??;

        tracing::trace!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant scope entered");
        Ok(ScopeGuard { tenant: tenant.id })
    }

    /// Run `fut` with `tenant` bound, opening a context if none exists
    pub async fn run<F, T>(&self, tenant: &Tenant, fut: F) -> Result<T, ScopeError>
    where
        F: Future<Output = T>,
    {
        if SCOPE_SLOT.try_with(|_| ()).is_ok() {
            let _guard = self.enter_scope(tenant)?;
            return Ok(fut.await);
        }

        SCOPE_SLOT
            .scope(RefCell::new(None), async move {
                let _guard = self.enter_scope(tenant)?;
                Ok(fut.await)
            })
            .await
    }

    pub fn current_tenant(&self) -> Result<TenantScope, ScopeError> {
        current_scope()
    }

    pub fn is_bound(&self) -> bool {
        current_scope().is_ok()
    }
}

/// Run `fut` in a fresh, unbound scope context
pub async fn scoped_context<F: Future>(fut: F) -> F::Output {
    SCOPE_SLOT.scope(RefCell::new(None), fut).await
}

/// The scope bound to the current execution, if any
pub fn current_scope() -> Result<TenantScope, ScopeError> {
    SCOPE_SLOT
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
        .ok_or(ScopeError::Unresolved)
}
