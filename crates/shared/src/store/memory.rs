//! In-memory tenant store.
//!
//! Not durable. Every collection is keyed by `TenantId` first so a lookup for
//! one tenant can never see another tenant's rows. The (tenant, reference)
//! uniqueness of payments is enforced under the write lock, which plays the
//! role of the database constraint for concurrent reconcilers in one process.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::TenantStore;
use crate::error::StoreResult;
use crate::models::{InsertOutcome, NewPaymentRecord, PaymentRecord, PaymentSettings, TenantId};

#[derive(Debug, Clone)]
pub struct StoredAdmin {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Default)]
struct TenantRows {
    settings: Option<PaymentSettings>,
    /// keyed by reference
    payments: HashMap<String, PaymentRecord>,
    students: HashSet<i64>,
    classes: HashSet<i64>,
    fee_rules: HashSet<i64>,
    admins: Vec<StoredAdmin>,
}

impl TenantRows {
    fn row_count(&self) -> u64 {
        (self.settings.is_some() as usize
            + self.payments.len()
            + self.students.len()
            + self.classes.len()
            + self.fee_rules.len()
            + self.admins.len()) as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTenantStore {
    tenants: Arc<RwLock<HashMap<TenantId, TenantRows>>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(&self, tenant: TenantId, student_id: i64) {
        self.tenants
            .write()
            .await
            .entry(tenant)
            .or_default()
            .students
            .insert(student_id);
    }

    pub async fn add_class(&self, tenant: TenantId, class_id: i64) {
        self.tenants
            .write()
            .await
            .entry(tenant)
            .or_default()
            .classes
            .insert(class_id);
    }

    pub async fn add_fee_rule(&self, tenant: TenantId, fee_rule_id: i64) {
        self.tenants
            .write()
            .await
            .entry(tenant)
            .or_default()
            .fee_rules
            .insert(fee_rule_id);
    }

    pub async fn payment_count(&self, tenant: TenantId) -> usize {
        self.tenants
            .read()
            .await
            .get(&tenant)
            .map_or(0, |rows| rows.payments.len())
    }

    pub async fn admins(&self, tenant: TenantId) -> Vec<StoredAdmin> {
        self.tenants
            .read()
            .await
            .get(&tenant)
            .map(|rows| rows.admins.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn payment_settings(&self, tenant: TenantId) -> StoreResult<Option<PaymentSettings>> {
        Ok(self
            .tenants
            .read()
            .await
            .get(&tenant)
            .and_then(|rows| rows.settings.clone()))
    }

    async fn save_payment_settings(
        &self,
        tenant: TenantId,
        settings: &PaymentSettings,
    ) -> StoreResult<()> {
        self.tenants.write().await.entry(tenant).or_default().settings = Some(settings.clone());
        Ok(())
    }

    async fn find_payment(
        &self,
        tenant: TenantId,
        reference: &str,
    ) -> StoreResult<Option<PaymentRecord>> {
        Ok(self
            .tenants
            .read()
            .await
            .get(&tenant)
            .and_then(|rows| rows.payments.get(reference).cloned()))
    }

    async fn insert_payment(
        &self,
        tenant: TenantId,
        payment: NewPaymentRecord,
    ) -> StoreResult<InsertOutcome> {
        let mut tenants = self.tenants.write().await;
        let rows = tenants.entry(tenant).or_default();
        if rows.payments.contains_key(&payment.reference) {
            return Ok(InsertOutcome::Duplicate);
        }
        let record = payment.into_record(tenant, OffsetDateTime::now_utc());
        rows.payments.insert(record.reference.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn mark_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let mut tenants = self.tenants.write().await;
        let record = tenants.get_mut(&tenant).and_then(|rows| {
            rows.payments
                .values_mut()
                .find(|p| p.id == payment_id && p.notified_at.is_none())
        });
        Ok(match record {
            Some(record) => {
                record.notified_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn release_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        claimed_at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let mut tenants = self.tenants.write().await;
        let record = tenants.get_mut(&tenant).and_then(|rows| {
            rows.payments
                .values_mut()
                .find(|p| p.id == payment_id && p.notified_at == Some(claimed_at))
        });
        Ok(match record {
            Some(record) => {
                record.notified_at = None;
                true
            }
            None => false,
        })
    }

    async fn list_unnotified(
        &self,
        tenant: TenantId,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRecord>> {
        let tenants = self.tenants.read().await;
        let mut pending: Vec<PaymentRecord> = tenants
            .get(&tenant)
            .map(|rows| {
                rows.payments
                    .values()
                    .filter(|p| p.notified_at.is_none() && p.created_at < created_before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        pending.sort_by_key(|p| p.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_student_payments(
        &self,
        tenant: TenantId,
        student_id: i64,
    ) -> StoreResult<Vec<PaymentRecord>> {
        let tenants = self.tenants.read().await;
        let mut payments: Vec<PaymentRecord> = tenants
            .get(&tenant)
            .map(|rows| {
                rows.payments
                    .values()
                    .filter(|p| p.student_id == student_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        payments.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(payments)
    }

    async fn student_exists(&self, tenant: TenantId, student_id: i64) -> StoreResult<bool> {
        Ok(self
            .tenants
            .read()
            .await
            .get(&tenant)
            .is_some_and(|rows| rows.students.contains(&student_id)))
    }

    async fn class_exists(&self, tenant: TenantId, class_id: i64) -> StoreResult<bool> {
        Ok(self
            .tenants
            .read()
            .await
            .get(&tenant)
            .is_some_and(|rows| rows.classes.contains(&class_id)))
    }

    async fn fee_rule_exists(&self, tenant: TenantId, fee_rule_id: i64) -> StoreResult<bool> {
        Ok(self
            .tenants
            .read()
            .await
            .get(&tenant)
            .is_some_and(|rows| rows.fee_rules.contains(&fee_rule_id)))
    }

    async fn insert_admin(
        &self,
        tenant: TenantId,
        email: &str,
        password_hash: &str,
    ) -> StoreResult<Uuid> {
        let mut tenants = self.tenants.write().await;
        let admins = &mut tenants.entry(tenant).or_default().admins;
        if let Some(existing) = admins.iter_mut().find(|a| a.email == email) {
            existing.password_hash = password_hash.to_string();
            return Ok(existing.id);
        }
        let id = Uuid::new_v4();
        admins.push(StoredAdmin {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }

    async fn purge_tenant(&self, tenant: TenantId) -> StoreResult<u64> {
        Ok(self
            .tenants
            .write()
            .await
            .remove(&tenant)
            .map_or(0, |rows| rows.row_count()))
    }
}
