//! Postgres-backed tenant store
//!
//! All tenant data lives in shared tables keyed by `tenant_id`; every query
//! here carries a `tenant_id = $1` predicate. Payment uniqueness is the
//! `payments_tenant_reference_key` constraint, claimed with
//! `INSERT ... ON CONFLICT DO NOTHING RETURNING` so concurrent reconcilers on
//! independent processes produce exactly one row.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::TenantStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    InsertOutcome, NewPaymentRecord, PaymentMode, PaymentRecord, PaymentSettings, PaymentStatus,
    TenantId,
};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const PAYMENT_COLUMNS: &str = r#"
    id, tenant_id, student_id, class_id, fee_rule_id, amount_minor, currency,
    reference, status, provider_transaction_id, provider_payload, paid_at,
    receipt_number, notified_at, created_at
"#;

/// Database row type for the `payments` table
#[derive(Debug, FromRow)]
struct PaymentRow {
    id: Uuid,
    tenant_id: i64,
    student_id: i64,
    class_id: Option<i64>,
    fee_rule_id: Option<i64>,
    amount_minor: i64,
    currency: String,
    reference: String,
    status: String,
    provider_transaction_id: String,
    provider_payload: serde_json::Value,
    paid_at: OffsetDateTime,
    receipt_number: String,
    notified_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "success" => PaymentStatus::Success,
            other => {
                return Err(StoreError::CorruptRow(format!(
                    "payment {} has status '{}'",
                    row.id, other
                )))
            }
        };

        Ok(PaymentRecord {
            id: row.id,
            tenant_id: TenantId(row.tenant_id),
            student_id: row.student_id,
            class_id: row.class_id,
            fee_rule_id: row.fee_rule_id,
            amount_minor: row.amount_minor,
            currency: row.currency,
            reference: row.reference,
            status,
            provider_transaction_id: row.provider_transaction_id,
            provider_payload: row.provider_payload,
            paid_at: row.paid_at,
            receipt_number: row.receipt_number,
            notified_at: row.notified_at,
            created_at: row.created_at,
        })
    }
}

/// Database row type for the `payment_settings` table
#[derive(FromRow)]
struct PaymentSettingsRow {
    mode: String,
    provider_secret: Option<String>,
    currency: String,
}

#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, table: &'static str, tenant: TenantId, id: i64) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE tenant_id = $1 AND id = $2)",
            table
        );
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(tenant.get())
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn payment_settings(&self, tenant: TenantId) -> StoreResult<Option<PaymentSettings>> {
        let row: Option<PaymentSettingsRow> = sqlx::query_as(
            "SELECT mode, provider_secret, currency FROM payment_settings WHERE tenant_id = $1",
        )
        .bind(tenant.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(PaymentSettings {
                mode: row
                    .mode
                    .parse::<PaymentMode>()
                    .map_err(StoreError::CorruptRow)?,
                provider_secret: row.provider_secret,
                currency: row.currency,
            })
        })
        .transpose()
    }

    async fn save_payment_settings(
        &self,
        tenant: TenantId,
        settings: &PaymentSettings,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_settings (tenant_id, mode, provider_secret, currency)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE SET
                mode = EXCLUDED.mode,
                provider_secret = EXCLUDED.provider_secret,
                currency = EXCLUDED.currency,
                updated_at = NOW()
            "#,
        )
        .bind(tenant.get())
        .bind(settings.mode.as_str())
        .bind(&settings.provider_secret)
        .bind(&settings.currency)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_payment(
        &self,
        tenant: TenantId,
        reference: &str,
    ) -> StoreResult<Option<PaymentRecord>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE tenant_id = $1 AND reference = $2",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(tenant.get())
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn insert_payment(
        &self,
        tenant: TenantId,
        payment: NewPaymentRecord,
    ) -> StoreResult<InsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO payments
                (id, tenant_id, student_id, class_id, fee_rule_id, amount_minor, currency,
                 reference, status, provider_transaction_id, provider_payload, paid_at,
                 receipt_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'success', $9, $10, $11, $12)
            ON CONFLICT ON CONSTRAINT payments_tenant_reference_key DO NOTHING
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );

        let inserted: Result<Option<PaymentRow>, sqlx::Error> = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant.get())
            .bind(payment.student_id)
            .bind(payment.class_id)
            .bind(payment.fee_rule_id)
            .bind(payment.amount_minor)
            .bind(&payment.currency)
            .bind(&payment.reference)
            .bind(&payment.provider_transaction_id)
            .bind(&payment.provider_payload)
            .bind(payment.paid_at)
            .bind(&payment.receipt_number)
            .fetch_optional(&self.pool)
            .await;

        match inserted {
            Ok(Some(row)) => Ok(InsertOutcome::Inserted(PaymentRecord::try_from(row)?)),
            Ok(None) => Ok(InsertOutcome::Duplicate),
            // A unique violation on any path means the reference is already recorded
            Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn mark_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET notified_at = $3
            WHERE tenant_id = $1 AND id = $2 AND notified_at IS NULL
            "#,
        )
        .bind(tenant.get())
        .bind(payment_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_notified(
        &self,
        tenant: TenantId,
        payment_id: Uuid,
        claimed_at: OffsetDateTime,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET notified_at = NULL
            WHERE tenant_id = $1 AND id = $2 AND notified_at = $3
            "#,
        )
        .bind(tenant.get())
        .bind(payment_id)
        .bind(claimed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_unnotified(
        &self,
        tenant: TenantId,
        created_before: OffsetDateTime,
        limit: i64,
    ) -> StoreResult<Vec<PaymentRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE tenant_id = $1 AND notified_at IS NULL AND created_at < $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(tenant.get())
            .bind(created_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn list_student_payments(
        &self,
        tenant: TenantId,
        student_id: i64,
    ) -> StoreResult<Vec<PaymentRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE tenant_id = $1 AND student_id = $2
            ORDER BY paid_at DESC
            "#,
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(tenant.get())
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    async fn student_exists(&self, tenant: TenantId, student_id: i64) -> StoreResult<bool> {
        self.exists("students", tenant, student_id).await
    }

    async fn class_exists(&self, tenant: TenantId, class_id: i64) -> StoreResult<bool> {
        self.exists("classes", tenant, class_id).await
    }

    async fn fee_rule_exists(&self, tenant: TenantId, fee_rule_id: i64) -> StoreResult<bool> {
        self.exists("fee_rules", tenant, fee_rule_id).await
    }

    async fn insert_admin(
        &self,
        tenant: TenantId,
        email: &str,
        password_hash: &str,
    ) -> StoreResult<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tenant_admins (id, tenant_id, email, password_hash, must_change_password)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (tenant_id, email) DO UPDATE
            SET password_hash = EXCLUDED.password_hash, must_change_password = TRUE
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant.get())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn purge_tenant(&self, tenant: TenantId) -> StoreResult<u64> {
        // Children before parents; each table is keyed by tenant_id
        const TABLES: &[&str] = &[
            "payments",
            "fee_rules",
            "students",
            "classes",
            "payment_settings",
            "tenant_admins",
        ];

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for table in TABLES {
            let sql = format!("DELETE FROM {} WHERE tenant_id = $1", table);
            let result = sqlx::query(&sql).bind(tenant.get()).execute(&mut *tx).await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        tracing::info!(tenant_id = %tenant, rows = removed, "Tenant-scoped rows purged");
        Ok(removed)
    }
}
