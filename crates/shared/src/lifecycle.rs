//! Tenant lifecycle: registration, approval, decline, restriction and deletion
//!
//! Approval provisions the first administrator and only then activates the
//! tenant, so a failed approval leaves it `pending` and can be retried.
//! Deletion purges tenant-scoped rows and files before the directory row so a
//! failure part-way leaves the tenant addressable for a retry.

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::TenantDirectory;
use crate::error::{DirectoryError, LifecycleError, LifecycleResult};
use crate::files::TenantFileStore;
use crate::models::{NewTenant, Restriction, Tenant, TenantId, TenantStatus};
use crate::store::TenantStore;

const TEMP_PASSWORD_LEN: usize = 16;

/// First administrator of an approved tenant.
///
/// `temporary_password` is the only copy of the plain password; it is handed
/// to the mailer once and must be changed at first login.
#[derive(Clone)]
pub struct AdminCredentials {
    pub admin_id: Uuid,
    pub email: String,
    pub temporary_password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("admin_id", &self.admin_id)
            .field("email", &self.email)
            .field("temporary_password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApprovedTenant {
    pub tenant: Tenant,
    pub admin: AdminCredentials,
}

/// Creates the per-tenant resources an approved tenant needs
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    async fn provision_admin(&self, tenant: &Tenant) -> LifecycleResult<AdminCredentials>;
}

/// Provisions the administrator as a row in the tenant store
pub struct StoreProvisioner {
    store: Arc<dyn TenantStore>,
}

impl StoreProvisioner {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }
}

fn temporary_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn hash_password(password: &str) -> LifecycleResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LifecycleError::Provisioning(format!("password hashing failed: {e}")))
}

#[async_trait]
impl TenantProvisioner for StoreProvisioner {
    async fn provision_admin(&self, tenant: &Tenant) -> LifecycleResult<AdminCredentials> {
        let password = temporary_password();
        let password_hash = hash_password(&password)?;
        let admin_id = self
            .store
            .insert_admin(tenant.id, &tenant.contact_email, &password_hash)
            .await?;

        tracing::info!(tenant_id = %tenant.id, admin_id = %admin_id, "Tenant administrator provisioned");
        Ok(AdminCredentials {
            admin_id,
            email: tenant.contact_email.clone(),
            temporary_password: password,
        })
    }
}

pub struct TenantLifecycle {
    directory: Arc<dyn TenantDirectory>,
    store: Arc<dyn TenantStore>,
    files: Arc<dyn TenantFileStore>,
    provisioner: Arc<dyn TenantProvisioner>,
}

impl TenantLifecycle {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        store: Arc<dyn TenantStore>,
        files: Arc<dyn TenantFileStore>,
        provisioner: Arc<dyn TenantProvisioner>,
    ) -> Self {
        Self {
            directory,
            store,
            files,
            provisioner,
        }
    }

    pub async fn register(&self, new_tenant: NewTenant) -> LifecycleResult<Tenant> {
        if new_tenant.name.trim().is_empty() {
            return Err(LifecycleError::InvalidInput("name is required".to_string()));
        }
        if !new_tenant.contact_email.contains('@') {
            return Err(LifecycleError::InvalidInput(
                "contact email is invalid".to_string(),
            ));
        }
        let tenant = self.directory.register(new_tenant).await?;
        tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant registered");
        Ok(tenant)
    }

    /// Provision the administrator of a pending tenant, then activate it
    pub async fn approve(&self, id: TenantId) -> LifecycleResult<ApprovedTenant> {
        let pending = self
            .directory
            .find_by_id(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))?;
        if pending.status != TenantStatus::Pending {
            return Err(DirectoryError::InvalidTransition {
                from: pending.status,
                action: "approve",
            }
            .into());
        }

        let admin = self.provisioner.provision_admin(&pending).await?;
        let tenant = self.directory.activate(id).await?;
        tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant approved");
        Ok(ApprovedTenant { tenant, admin })
    }

    pub async fn decline(&self, id: TenantId, reason: &str) -> LifecycleResult<Tenant> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LifecycleError::InvalidInput(
                "a decline reason is required".to_string(),
            ));
        }
        let tenant = self.directory.decline(id, reason).await?;
        tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant declined");
        Ok(tenant)
    }

    pub async fn restrict(
        &self,
        id: TenantId,
        login: Restriction,
        site: Restriction,
    ) -> LifecycleResult<Tenant> {
        let tenant = self.directory.set_restrictions(id, login, site).await?;
        tracing::info!(
            tenant_id = %tenant.id,
            login_blocked = tenant.is_login_blocked(),
            site_blocked = tenant.is_site_blocked(),
            "Tenant restrictions updated"
        );
        Ok(tenant)
    }

    /// Delete an active tenant with all of its data
    pub async fn delete(&self, id: TenantId) -> LifecycleResult<()> {
        let tenant = self
            .directory
            .find_by_id(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))?;
        if tenant.status != TenantStatus::Active {
            return Err(DirectoryError::InvalidTransition {
                from: tenant.status,
                action: "delete",
            }
            .into());
        }

        let rows = self.store.purge_tenant(id).await?;
        self.files.purge(id).await?;
        self.directory.remove(id).await?;

        tracing::warn!(tenant_id = %id, slug = %tenant.slug, rows, "Tenant deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryTenantDirectory;
    use crate::models::TenantSlug;
    use crate::store::InMemoryTenantStore;
    use argon2::password_hash::PasswordHash;
    use argon2::PasswordVerifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then provisions normally
    struct FlakyProvisioner {
        failures: AtomicUsize,
        inner: StoreProvisioner,
    }

    #[async_trait]
    impl TenantProvisioner for FlakyProvisioner {
        async fn provision_admin(&self, tenant: &Tenant) -> LifecycleResult<AdminCredentials> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LifecycleError::Provisioning("mailer unavailable".to_string()));
            }
            self.inner.provision_admin(tenant).await
        }
    }

    #[derive(Default)]
    struct CountingFiles {
        purged: AtomicUsize,
    }

    #[async_trait]
    impl TenantFileStore for CountingFiles {
        async fn purge(&self, _tenant: TenantId) -> crate::error::StoreResult<()> {
            self.purged.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        lifecycle: TenantLifecycle,
        directory: Arc<InMemoryTenantDirectory>,
        store: Arc<InMemoryTenantStore>,
        files: Arc<CountingFiles>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryTenantDirectory::new());
        let store = Arc::new(InMemoryTenantStore::new());
        let files = Arc::new(CountingFiles::default());
        let lifecycle = TenantLifecycle::new(
            directory.clone(),
            store.clone(),
            files.clone(),
            Arc::new(StoreProvisioner::new(store.clone())),
        );
        Fixture {
            lifecycle,
            directory,
            store,
            files,
        }
    }

    fn greenwood() -> NewTenant {
        NewTenant {
            slug: TenantSlug::parse("greenwood").unwrap(),
            name: "Greenwood Academy".to_string(),
            contact_email: "bursar@greenwood.example".to_string(),
        }
    }

    #[tokio::test]
    async fn test_approve_provisions_hashed_admin() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        assert_eq!(tenant.status, TenantStatus::Pending);

        let approved = f.lifecycle.approve(tenant.id).await.unwrap();
        assert_eq!(approved.tenant.status, TenantStatus::Active);
        assert_eq!(approved.admin.temporary_password.len(), TEMP_PASSWORD_LEN);

        let admins = f.store.admins(tenant.id).await;
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, "bursar@greenwood.example");
        assert_ne!(admins[0].password_hash, approved.admin.temporary_password);
        let parsed = PasswordHash::new(&admins[0].password_hash).unwrap();
        assert!(Argon2::default()
            .verify_password(approved.admin.temporary_password.as_bytes(), &parsed)
            .is_ok());
    }

    #[tokio::test]
    async fn test_failed_provisioning_keeps_tenant_pending() {
        let directory = Arc::new(InMemoryTenantDirectory::new());
        let store = Arc::new(InMemoryTenantStore::new());
        let lifecycle = TenantLifecycle::new(
            directory.clone(),
            store.clone(),
            Arc::new(CountingFiles::default()),
            Arc::new(FlakyProvisioner {
                failures: AtomicUsize::new(1),
                inner: StoreProvisioner::new(store.clone()),
            }),
        );
        let tenant = lifecycle.register(greenwood()).await.unwrap();

        assert!(matches!(
            lifecycle.approve(tenant.id).await,
            Err(LifecycleError::Provisioning(_))
        ));
        let after = directory.find_by_id(tenant.id).await.unwrap().unwrap();
        assert_eq!(after.status, TenantStatus::Pending);
        assert!(store.admins(tenant.id).await.is_empty());

        let approved = lifecycle.approve(tenant.id).await.unwrap();
        assert_eq!(approved.tenant.status, TenantStatus::Active);
        assert_eq!(store.admins(tenant.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reprovisioning_replaces_admin_password() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        let provisioner = StoreProvisioner::new(f.store.clone());

        let first = provisioner.provision_admin(&tenant).await.unwrap();
        let second = provisioner.provision_admin(&tenant).await.unwrap();
        assert_eq!(first.admin_id, second.admin_id);

        let admins = f.store.admins(tenant.id).await;
        assert_eq!(admins.len(), 1);
        let parsed = PasswordHash::new(&admins[0].password_hash).unwrap();
        assert!(Argon2::default()
            .verify_password(second.temporary_password.as_bytes(), &parsed)
            .is_ok());
    }

    #[tokio::test]
    async fn test_approve_twice_is_refused() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        f.lifecycle.approve(tenant.id).await.unwrap();
        assert!(matches!(
            f.lifecycle.approve(tenant.id).await,
            Err(LifecycleError::Directory(DirectoryError::InvalidTransition { .. }))
        ));
        assert_eq!(f.store.admins(tenant.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_credentials_debug_redacts_password() {
        let creds = AdminCredentials {
            admin_id: Uuid::new_v4(),
            email: "a@b.example".to_string(),
            temporary_password: "hunter2hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_decline_requires_reason() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        assert!(matches!(
            f.lifecycle.decline(tenant.id, "   ").await,
            Err(LifecycleError::InvalidInput(_))
        ));

        let declined = f
            .lifecycle
            .decline(tenant.id, "Could not verify school")
            .await
            .unwrap();
        assert_eq!(declined.status, TenantStatus::Declined);
        assert!(matches!(
            f.lifecycle.approve(tenant.id).await,
            Err(LifecycleError::Directory(DirectoryError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_delete_purges_data_then_directory_row() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        f.lifecycle.approve(tenant.id).await.unwrap();
        f.store.add_student(tenant.id, 42).await;

        f.lifecycle.delete(tenant.id).await.unwrap();

        assert!(!f.store.student_exists(tenant.id, 42).await.unwrap());
        assert_eq!(f.files.purged.load(Ordering::SeqCst), 1);
        assert!(f.directory.find_by_id(tenant.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_requires_active_tenant() {
        let f = fixture();
        let tenant = f.lifecycle.register(greenwood()).await.unwrap();
        assert!(matches!(
            f.lifecycle.delete(tenant.id).await,
            Err(LifecycleError::Directory(DirectoryError::InvalidTransition { .. }))
        ));
        assert_eq!(f.files.purged.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_register_validates_contact() {
        let f = fixture();
        let mut bad = greenwood();
        bad.contact_email = "not-an-email".to_string();
        assert!(matches!(
            f.lifecycle.register(bad).await,
            Err(LifecycleError::InvalidInput(_))
        ));
    }
}
