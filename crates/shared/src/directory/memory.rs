//! In-memory tenant directory.
//!
//! Used by tests and local development. State lives in a `HashMap` behind a
//! `tokio::sync::RwLock` and is lost on restart. Slug uniqueness is enforced
//! under the write lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::TenantDirectory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::models::{NewTenant, Restriction, Tenant, TenantId, TenantSlug, TenantStatus};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    tenants: HashMap<TenantId, Tenant>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantDirectory {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and activate in one step (test fixtures, local seeding)
    pub async fn insert_active(&self, tenant: NewTenant) -> DirectoryResult<Tenant> {
        let created = self.register(tenant).await?;
        self.activate(created.id).await
    }

    async fn transition(
        &self,
        id: TenantId,
        action: &'static str,
        apply: impl FnOnce(&mut Tenant),
    ) -> DirectoryResult<Tenant> {
        let mut inner = self.inner.write().await;
        let tenant = inner
            .tenants
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound(id))?;
        if tenant.status != TenantStatus::Pending {
            return Err(DirectoryError::InvalidTransition {
                from: tenant.status,
                action,
            });
        }
        apply(tenant);
        tenant.updated_at = OffsetDateTime::now_utc();
        Ok(tenant.clone())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn find_by_slug(&self, slug: &TenantSlug) -> DirectoryResult<Option<Tenant>> {
        let inner = self.inner.read().await;
        Ok(inner.tenants.values().find(|t| &t.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: TenantId) -> DirectoryResult<Option<Tenant>> {
        Ok(self.inner.read().await.tenants.get(&id).cloned())
    }

    async fn list_active(&self) -> DirectoryResult<Vec<Tenant>> {
        let inner = self.inner.read().await;
        let mut active: Vec<Tenant> = inner
            .tenants
            .values()
            .filter(|t| t.is_resolvable())
            .cloned()
            .collect();
        active.sort_by_key(|t| t.id);
        Ok(active)
    }

    async fn register(&self, tenant: NewTenant) -> DirectoryResult<Tenant> {
        let mut inner = self.inner.write().await;
        if inner.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(DirectoryError::SlugTaken(tenant.slug.to_string()));
        }

        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let created = Tenant {
            id: TenantId(inner.next_id),
            slug: tenant.slug,
            name: tenant.name,
            contact_email: tenant.contact_email,
            status: TenantStatus::Pending,
            login_restriction: Restriction::none(),
            site_restriction: Restriction::none(),
            decline_reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.tenants.insert(created.id, created.clone());
        Ok(created)
    }

    async fn activate(&self, id: TenantId) -> DirectoryResult<Tenant> {
        self.transition(id, "approve", |t| t.status = TenantStatus::Active)
            .await
    }

    async fn decline(&self, id: TenantId, reason: &str) -> DirectoryResult<Tenant> {
        let reason = reason.to_string();
        self.transition(id, "decline", move |t| {
            t.status = TenantStatus::Declined;
            t.decline_reason = Some(reason);
        })
        .await
    }

    async fn set_restrictions(
        &self,
        id: TenantId,
        login: Restriction,
        site: Restriction,
    ) -> DirectoryResult<Tenant> {
        let mut inner = self.inner.write().await;
        let tenant = inner
            .tenants
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound(id))?;
        tenant.login_restriction = login;
        tenant.site_restriction = site;
        tenant.updated_at = OffsetDateTime::now_utc();
        Ok(tenant.clone())
    }

    async fn remove(&self, id: TenantId) -> DirectoryResult<()> {
        self.inner
            .write()
            .await
            .tenants
            .remove(&id)
            .map(|_| ())
            .ok_or(DirectoryError::NotFound(id))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::find_resolvable;

    fn new_tenant(slug: &str) -> NewTenant {
        NewTenant {
            slug: TenantSlug::parse(slug).unwrap(),
            name: format!("{} school", slug),
            contact_email: format!("admin@{}.example", slug),
        }
    }

    #[tokio::test]
    async fn test_register_starts_pending() {
        let dir = InMemoryTenantDirectory::new();
        let tenant = dir.register(new_tenant("greenwood")).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Pending);
        assert!(!tenant.is_resolvable());
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let dir = InMemoryTenantDirectory::new();
        dir.register(new_tenant("greenwood")).await.unwrap();
        let err = dir.register(new_tenant("greenwood")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::SlugTaken(_)));
    }

    #[tokio::test]
    async fn test_only_active_tenants_are_resolvable() {
        let dir = InMemoryTenantDirectory::new();
        let pending = dir.register(new_tenant("pending-school")).await.unwrap();
        let declined = dir.register(new_tenant("declined-school")).await.unwrap();
        dir.decline(declined.id, "incomplete documents").await.unwrap();
        dir.insert_active(new_tenant("greenwood")).await.unwrap();

        for (slug, expected) in [
            (&pending.slug, false),
            (&declined.slug, false),
            (&TenantSlug::parse("greenwood").unwrap(), true),
        ] {
            let found = find_resolvable(&dir, slug).await.unwrap();
            assert_eq!(found.is_some(), expected, "{}", slug);
        }
    }

    #[tokio::test]
    async fn test_declined_is_terminal() {
        let dir = InMemoryTenantDirectory::new();
        let tenant = dir.register(new_tenant("greenwood")).await.unwrap();
        let declined = dir.decline(tenant.id, "duplicate").await.unwrap();
        assert_eq!(declined.decline_reason.as_deref(), Some("duplicate"));

        let err = dir.activate(tenant.id).await.unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::InvalidTransition {
                from: TenantStatus::Declined,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_list_active_is_sorted_and_filtered() {
        let dir = InMemoryTenantDirectory::new();
        dir.insert_active(new_tenant("b-school")).await.unwrap();
        dir.register(new_tenant("c-school")).await.unwrap();
        dir.insert_active(new_tenant("a-school")).await.unwrap();

        let slugs: Vec<String> = dir
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.slug.to_string())
            .collect();
        assert_eq!(slugs, vec!["b-school", "a-school"]);
    }
}
