//! Tenant file storage boundary
//!
//! Uploads themselves are handled elsewhere; this service only needs to know
//! where a tenant's files live so they can be purged with the tenant.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::models::TenantId;

#[async_trait]
pub trait TenantFileStore: Send + Sync {
    /// Remove all files owned by the tenant; a tenant without files is not an error
    async fn purge(&self, tenant: TenantId) -> StoreResult<()>;
}

/// Files under `{root}/tenant-{id}/`
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tenant_dir(&self, tenant: TenantId) -> PathBuf {
        self.root.join(format!("tenant-{}", tenant))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TenantFileStore for LocalFileStore {
    async fn purge(&self, tenant: TenantId) -> StoreResult<()> {
        let dir = self.tenant_dir(tenant);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(tenant_id = %tenant, path = %dir.display(), "Tenant files purged");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Files(format!("{}: {}", dir.display(), e))),
        }
    }
}
