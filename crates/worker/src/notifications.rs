//! Payment notification catch-up
//!
//! Webhook reconciliation notifies inline; a record whose notification
//! failed keeps `notified_at` unset. This job retries those records once
//! they are older than a grace period, one tenant scope at a time.

use std::sync::Arc;
use std::time::Duration;

use campus_billing::{notify_and_mark, PaymentNotifier};
use campus_shared::{current_scope, ScopeError, ScopeManager, StoreError, TenantDirectory};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info};

/// Records younger than this may still be mid-reconciliation
pub const NOTIFY_GRACE: Duration = Duration::from_secs(120);

/// Records picked up per tenant per run
pub const BATCH_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatchUpReport {
    pub tenants: usize,
    pub pending: usize,
    pub notified: usize,
    pub errors: usize,
}

pub struct NotificationCatchUp {
    directory: Arc<dyn TenantDirectory>,
    scopes: ScopeManager,
    notifier: Arc<dyn PaymentNotifier>,
}

impl NotificationCatchUp {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        scopes: ScopeManager,
        notifier: Arc<dyn PaymentNotifier>,
    ) -> Self {
        Self {
            directory,
            scopes,
            notifier,
        }
    }

    /// One pass over every active tenant
    pub async fn run_once(&self, now: OffsetDateTime) -> CatchUpReport {
        let mut report = CatchUpReport::default();
        let tenants = match self.directory.list_active().await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!(error = %e, "Failed to list active tenants");
                report.errors += 1;
                return report;
            }
        };

        let created_before = now - NOTIFY_GRACE;
        for tenant in tenants {
            report.tenants += 1;
            let pass = self
                .scopes
                .run(&tenant, self.tenant_pass(created_before))
                .await
                .map_err(CatchUpError::from)
                .and_then(|pass| pass);
            match pass {
                Ok((pending, notified)) => {
                    report.pending += pending;
                    report.notified += notified;
                }
                Err(e) => {
                    error!(tenant_id = %tenant.id, error = %e, "Notification catch-up failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            tenants = report.tenants,
            pending = report.pending,
            notified = report.notified,
            errors = report.errors,
            "Notification catch-up complete"
        );
        report
    }

    async fn tenant_pass(
        &self,
        created_before: OffsetDateTime,
    ) -> Result<(usize, usize), CatchUpError> {
        let scope = current_scope()?;
        let records = scope
            .db()
            .list_unnotified(created_before, BATCH_LIMIT)
            .await?;

        let mut notified = 0;
        for record in &records {
            if notify_and_mark(self.notifier.as_ref(), &scope, record).await {
                notified += 1;
            }
        }
        Ok((records.len(), notified))
    }
}
