//! Tenant-scoped storage
//!
//! Every method takes the owning `TenantId` and filters by it. Request code
//! never calls these directly; it goes through the `TenantDb` handle bound to
//! its scope, which supplies the tenant id itself.

use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{InsertOutcome, NewPaymentRecord, PaymentRecord, PaymentSettings, TenantId};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTenantStore;
pub use postgres::PgTenantStore;

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn payment_settings(&self, tenant: TenantId) -> StoreResult<Option<PaymentSettings>>;
    async fn save_payment_settings(
        &self,
        tenant: TenantId,
        settings: &PaymentSettings,
    ) -> StoreResult<()>;

    async fn find_payment(
        &self,
        tenant: TenantId,
        reference: &str,
    ) -> StoreResult<Option<PaymentRecord>>;
    /// Insert guarded by the (tenant, reference) uniqueness constraint
    async fn insert_payment(
        &self,
        tenant: TenantId,
        payment: NewPaymentRecord,
    ) -> StoreResult<InsertOutcome>;
    /// Set `notified_at` if still unset; returns whether this call set it
    async fn mark_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        at: OffsetDateTime,
    ) -> StoreResult<bool>;
    /// Clear `notified_at` if it still holds `claimed_at`; returns whether it was cleared
    async fn release_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        claimed_at: OffsetDateTime,
    ) -> StoreResult<bool>;
    async fn list_unnotified(
        &self,
        tenant: TenantId,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRecord>>;
    async fn list_student_payments(
        &self,
        tenant: TenantId,
        student_id: i64,
    ) -> StoreResult<Vec<PaymentRecord>>;

    async fn student_exists(&self, tenant: TenantId, student_id: i64) -> StoreResult<bool>;
    async fn class_exists(&self, tenant: TenantId, class_id: i64) -> StoreResult<bool>;
    async fn fee_rule_exists(&self, tenant: TenantId, fee_rule_id: i64) -> StoreResult<bool>;

    /// Create the tenant's administrator identity, or reset its password if it exists
    async fn insert_admin(
        &self,
        tenant: TenantId,
        email: &str,
        password_hash: &str,
    ) -> StoreResult<Uuid>;

    /// Remove every tenant-scoped row; returns rows removed
    async fn purge_tenant(&self, tenant: TenantId) -> StoreResult<u64>;
}

/// Store handle bound to one tenant
///
/// Holds the tenant id and passes it to every call, so code holding a
/// `TenantDb` cannot address another tenant's rows.
#[derive(Clone)]
pub struct TenantDb {
    tenant: TenantId,
    store: Arc<dyn TenantStore>,
}

impl TenantDb {
    pub fn new(tenant: TenantId, store: Arc<dyn TenantStore>) -> Self {
        Self { tenant, store }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant
    }

    pub async fn payment_settings(&self) -> StoreResult<Option<PaymentSettings>> {
        self.store.payment_settings(self.tenant).await
    }

    pub async fn find_payment(&self, reference: &str) -> StoreResult<Option<PaymentRecord>> {
        self.store.find_payment(self.tenant, reference).await
    }

    pub async fn insert_payment(&self, payment: NewPaymentRecord) -> StoreResult<InsertOutcome> {
        self.store.insert_payment(self.tenant, payment).await
    }

    pub async fn mark_notified(&self, payment_id: Uuid, at: OffsetDateTime) -> StoreResult<bool> {
        self.store.mark_notified(self.tenant, payment_id, at).await
    }

    pub async fn release_notified(
        &self,
        payment_id: Uuid,
        claimed_at: OffsetDateTime,
    ) -> StoreResult<bool> {
        self.store
            .release_notified(self.tenant, payment_id, claimed_at)
            .await
    }

    pub async fn list_unnotified(
        &self,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRecord>> {
        self.store
            .list_unnotified(self.tenant, created_before, limit)
            .await
    }

    pub async fn list_student_payments(&self, student_id: i64) -> StoreResult<Vec<PaymentRecord>> {
        self.store.list_student_payments(self.tenant, student_id).await
    }

    pub async fn student_exists(&self, student_id: i64) -> StoreResult<bool> {
        self.store.student_exists(self.tenant, student_id).await
    }

    pub async fn class_exists(&self, class_id: i64) -> StoreResult<bool> {
        self.store.class_exists(self.tenant, class_id).await
    }

    pub async fn fee_rule_exists(&self, fee_rule_id: i64) -> StoreResult<bool> {
        self.store.fee_rule_exists(self.tenant, fee_rule_id).await
    }
}

impl std::fmt::Debug for TenantDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantDb")
            .field("tenant", &self.tenant)
            .finish()
    }
}
