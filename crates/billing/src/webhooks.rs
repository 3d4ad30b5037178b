//! Payment webhook reconciliation
//!
//! Turns a signed provider callback into at most one payment record for the
//! tenant named in its metadata:
//!
//! ```text
//! Received -> SignatureVerified -> TenantResolved -> ProviderVerified -> Recorded
//!     \             \                    \                  \-> AlreadyRecorded / ProviderDeclined
//!      \-> 401        \-> 400 / ignored    \-> 404 / 422       \-> 422 entity mismatch / 502 gateway
//! ```
//!
//! The payload is only trusted for routing (which tenant, which reference).
//! Amount, currency and status come from the provider's verify call made with
//! the tenant's own secret, and every entity id in the metadata is checked
//! against the tenant's own rows before anything is written.
//!
//! Exactly-once recording rests on the `(tenant_id, reference)` uniqueness
//! constraint. Concurrent deliveries of the same event both reach the insert;
//! the loser sees `InsertOutcome::Duplicate` and reports `AlreadyRecorded`.

use campus_shared::cache::fee_summary_key;
use campus_shared::{
    current_scope, find_resolvable, DirectoryError, InsertOutcome, NewPaymentRecord,
    PaymentRecord, ScopeError, ScopeManager, StoreError, Tenant, TenantDirectory, TenantId,
    TenantScope, TenantSlug,
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use crate::gateway::{GatewayError, PaymentGateway};
use crate::notify::{NotifyError, PaymentNotifier};
use crate::signature;

pub const CHARGE_SUCCESS: &str = "charge.success";
const RECEIPT_PREFIX: &str = "RCT-";
const RECEIPT_BODY_LEN: usize = 10;
const MAX_REFERENCE_LEN: usize = 100;

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub data: Option<ChargeData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeData {
    #[serde(default)]
    pub reference: Option<String>,
    /// Minor units, as claimed by the payload; informational only
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "metadata_object")]
    pub metadata: Option<PaymentMetadata>,
}

/// Metadata attached when the checkout was initialized
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentMetadata {
    #[serde(default)]
    pub school_subdomain: Option<String>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub student_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub class_id: Option<i64>,
    #[serde(default, deserialize_with = "flexible_id")]
    pub fee_rule_id: Option<i64>,
    #[serde(default)]
    pub payer_email: Option<String>,
}

/// Provider metadata arrives as an object, a JSON-encoded string, or an
/// empty string.
fn metadata_object<'de, D>(deserializer: D) -> Result<Option<PaymentMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => serde_json::from_str(&s).map(Some).map_err(D::Error::custom),
        value @ serde_json::Value::Object(_) => {
            serde_json::from_value(value).map(Some).map_err(D::Error::custom)
        }
        other => Err(D::Error::custom(format!("unexpected metadata: {}", other))),
    }
}

/// Ids arrive as numbers or numeric strings
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("id out of range: {}", n))),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(None),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("id is not numeric: {}", s))),
        other => Err(D::Error::custom(format!("unexpected id: {}", other))),
    }
}

/// Fields a `charge.success` event must carry to be routed
#[derive(Debug, Clone)]
struct RoutedCharge {
    reference: String,
    slug: String,
    student_id: i64,
    class_id: Option<i64>,
    fee_rule_id: Option<i64>,
    claimed_amount: Option<i64>,
}

fn valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference.len() <= MAX_REFERENCE_LEN
        && reference.chars().any(|c| c.is_ascii_alphanumeric())
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
}

impl RoutedCharge {
    fn from_data(data: Option<ChargeData>) -> Result<Self, ReconcileError> {
        let data = data.ok_or(ReconcileError::MalformedPayload("data"))?;
        let reference = data
            .reference
            .map(|r| r.trim().to_string())
            .filter(|r| valid_reference(r))
            .ok_or(ReconcileError::MalformedPayload("reference"))?;
        let metadata = data
            .metadata
            .ok_or(ReconcileError::MalformedPayload("metadata"))?;
        let slug = metadata
            .school_subdomain
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ReconcileError::MalformedPayload("school_subdomain"))?;
        let student_id = metadata
            .student_id
            .ok_or(ReconcileError::MalformedPayload("student_id"))?;

        Ok(Self {
            reference,
            slug,
            student_id,
            class_id: metadata.class_id,
            fee_rule_id: metadata.fee_rule_id,
            claimed_amount: data.amount,
        })
    }
}

/// Deterministic receipt number for a payment reference
pub fn receipt_number(reference: &str) -> String {
    let body: String = reference
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(RECEIPT_BODY_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    format!("{}{}", RECEIPT_PREFIX, body)
}

// =============================================================================
// Outcomes and errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Recorded {
        tenant_id: TenantId,
        reference: String,
        receipt_number: String,
    },
    AlreadyRecorded {
        tenant_id: TenantId,
        reference: String,
    },
    /// The provider says the charge did not succeed; terminal, not retried
    ProviderDeclined {
        reference: String,
        status: String,
    },
    Ignored {
        event: String,
    },
}

impl ReconcileOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Recorded { .. } => "recorded",
            Self::AlreadyRecorded { .. } => "already_recorded",
            Self::ProviderDeclined { .. } => "provider_declined",
            Self::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook signature is missing or invalid")]
    SignatureInvalid,

    #[error("webhook payload is malformed: missing or invalid {0}")]
    MalformedPayload(&'static str),

    #[error("no active tenant for slug '{0}'")]
    TenantNotFound(String),

    #[error("automatic payments are disabled for tenant {0}")]
    AutomaticPaymentsDisabled(TenantId),

    #[error("{entity} {id} does not belong to tenant {tenant_id}")]
    EntityMismatch {
        tenant_id: TenantId,
        entity: &'static str,
        id: i64,
    },

    #[error("provider verification failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("tenant scope error: {0}")]
    Scope(#[from] ScopeError),
}

impl ReconcileError {
    /// Machine-readable reason safe to return to the caller
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SignatureInvalid => "invalid_signature",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::TenantNotFound(_) => "tenant_not_found",
            Self::AutomaticPaymentsDisabled(_) => "automatic_payments_disabled",
            Self::EntityMismatch { .. } => "entity_mismatch",
            Self::Gateway(_) => "gateway_unavailable",
            Self::Store(_) | Self::Directory(_) | Self::Scope(_) => "internal_error",
        }
    }

    /// HTTP status the webhook endpoint answers with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SignatureInvalid => 401,
            Self::MalformedPayload(_) => 400,
            Self::TenantNotFound(_) => 404,
            Self::AutomaticPaymentsDisabled(_) | Self::EntityMismatch { .. } => 422,
            Self::Gateway(_) => 502,
            Self::Store(_) | Self::Directory(_) | Self::Scope(_) => 500,
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct WebhookReconciler {
    webhook_secret: Vec<u8>,
    directory: Arc<dyn TenantDirectory>,
    scopes: ScopeManager,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn PaymentNotifier>,
}

impl WebhookReconciler {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        directory: Arc<dyn TenantDirectory>,
        scopes: ScopeManager,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
    ) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            directory,
            scopes,
            gateway,
            notifier,
        }
    }

    /// Verify, route and record one webhook delivery
    pub async fn reconcile(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if !signature::verify(&self.webhook_secret, raw_body, signature) {
            tracing::warn!(
                body_len = raw_body.len(),
                signature_present = signature.is_some(),
                "Rejected payment webhook with invalid signature"
            );
            return Err(ReconcileError::SignatureInvalid);
        }

        let event: WebhookEvent = serde_json::from_slice(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Payment webhook body is not a valid event");
            ReconcileError::MalformedPayload("body")
        })?;

        if event.event != CHARGE_SUCCESS {
            tracing::debug!(event = %event.event, "Ignoring payment webhook event");
            return Ok(ReconcileOutcome::Ignored { event: event.event });
        }

        let charge = RoutedCharge::from_data(event.data).inspect_err(|e| {
            tracing::warn!(event = CHARGE_SUCCESS, error = %e, "Payment webhook missing routing fields");
        })?;

        let tenant = self.resolve_tenant(&charge).await?;

        // Settings are read through a scope built for this tenant, not bound yet
        let settings = self
            .scopes
            .build_scope(&tenant)
            .db()
            .payment_settings()
            .await?;
        let secret = settings
            .as_ref()
            .and_then(|s| s.automatic_secret())
            .map(str::to_string)
            .ok_or_else(|| {
                tracing::warn!(
                    tenant_id = %tenant.id,
                    reference = %charge.reference,
                    "Payment webhook for tenant without automatic payments"
                );
                ReconcileError::AutomaticPaymentsDisabled(tenant.id)
            })?;

        self.scopes
            .run(&tenant, self.reconcile_in_scope(&secret, charge))
            .await?
    }

    async fn resolve_tenant(&self, charge: &RoutedCharge) -> Result<Tenant, ReconcileError> {
        let not_found = || {
            tracing::warn!(
                slug = %charge.slug,
                reference = %charge.reference,
                "Payment webhook for unknown or inactive tenant"
            );
            ReconcileError::TenantNotFound(charge.slug.clone())
        };

        let slug = TenantSlug::parse(&charge.slug).map_err(|_| not_found())?;
        find_resolvable(self.directory.as_ref(), &slug)
            .await?
            .ok_or_else(not_found)
    }

    /// Runs with the tenant bound; all reads and writes go through its scope
    async fn reconcile_in_scope(
        &self,
        secret: &str,
        charge: RoutedCharge,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let scope = current_scope()?;
        let tenant_id = scope.tenant_id();

        let verified = self
            .gateway
            .verify(secret, &charge.reference)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    tenant_id = %tenant_id,
                    reference = %charge.reference,
                    error = %e,
                    "Provider verification failed"
                );
            })?;

        if !verified.status.is_success() {
            tracing::info!(
                tenant_id = %tenant_id,
                reference = %charge.reference,
                status = %verified.status,
                "Provider reports charge not successful"
            );
            return Ok(ReconcileOutcome::ProviderDeclined {
                reference: charge.reference,
                status: verified.status.to_string(),
            });
        }

        if scope.db().find_payment(&charge.reference).await?.is_some() {
            tracing::info!(
                tenant_id = %tenant_id,
                reference = %charge.reference,
                "Payment already recorded"
            );
            return Ok(ReconcileOutcome::AlreadyRecorded {
                tenant_id,
                reference: charge.reference,
            });
        }

        self.check_entities(&scope, &charge).await?;

        if verified.amount_minor <= 0 {
            tracing::error!(
                tenant_id = %tenant_id,
                reference = %charge.reference,
                amount_minor = verified.amount_minor,
                "Provider reports a successful charge with no positive amount"
            );
            return Err(GatewayError::Malformed(format!(
                "non-positive amount {}",
                verified.amount_minor
            ))
            .into());
        }

        if let Some(claimed) = charge.claimed_amount {
            if claimed != verified.amount_minor {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    reference = %charge.reference,
                    claimed,
                    verified = verified.amount_minor,
                    "Webhook amount differs from provider; recording provider amount"
                );
            }
        }

        let receipt = receipt_number(&charge.reference);
        let payment = NewPaymentRecord {
            student_id: charge.student_id,
            class_id: charge.class_id,
            fee_rule_id: charge.fee_rule_id,
            amount_minor: verified.amount_minor,
            currency: verified.currency.to_ascii_uppercase(),
            reference: charge.reference.clone(),
            provider_transaction_id: verified.provider_transaction_id,
            provider_payload: verified.raw,
            paid_at: verified.paid_at.unwrap_or_else(OffsetDateTime::now_utc),
            receipt_number: receipt.clone(),
        };

        let record = match scope.db().insert_payment(payment).await? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Duplicate => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    reference = %charge.reference,
                    "Concurrent delivery already recorded this payment"
                );
                return Ok(ReconcileOutcome::AlreadyRecorded {
                    tenant_id,
                    reference: charge.reference,
                });
            }
        };

        tracing::info!(
            tenant_id = %tenant_id,
            reference = %record.reference,
            receipt_number = %record.receipt_number,
            amount_minor = record.amount_minor,
            "Payment recorded"
        );

        self.after_record(&scope, &record).await;

        Ok(ReconcileOutcome::Recorded {
            tenant_id,
            reference: record.reference,
            receipt_number: receipt,
        })
    }

    /// Every id in the metadata must name a row owned by the bound tenant
    async fn check_entities(
        &self,
        scope: &TenantScope,
        charge: &RoutedCharge,
    ) -> Result<(), ReconcileError> {
        let db = scope.db();
        let mut checks = vec![("student", charge.student_id, db.student_exists(charge.student_id).await?)];
        if let Some(class_id) = charge.class_id {
            checks.push(("class", class_id, db.class_exists(class_id).await?));
        }
        if let Some(fee_rule_id) = charge.fee_rule_id {
            checks.push(("fee_rule", fee_rule_id, db.fee_rule_exists(fee_rule_id).await?));
        }

        if let Some((entity, id, _)) = checks.into_iter().find(|(_, _, owned)| !owned) {
            tracing::error!(
                tenant_id = %scope.tenant_id(),
                slug = %scope.tenant().slug,
                reference = %charge.reference,
                entity,
                id,
                student_id = charge.student_id,
                class_id = ?charge.class_id,
                fee_rule_id = ?charge.fee_rule_id,
                "Webhook references an entity outside the tenant; nothing recorded"
            );
            return Err(ReconcileError::EntityMismatch {
                tenant_id: scope.tenant_id(),
                entity,
                id,
            });
        }
        Ok(())
    }

    /// Post-insert side effects; failures are logged and never undo the record
    async fn after_record(&self, scope: &TenantScope, record: &PaymentRecord) {
        if let Err(e) = scope.cache().forget(&fee_summary_key(record.student_id)).await {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                student_id = record.student_id,
                error = %e,
                "Failed to invalidate fee summary cache"
            );
        }

        notify_and_mark(self.notifier.as_ref(), scope, record).await;
    }
}

/// Claim the record's notification, then send it.
///
/// `notified_at` is set before the send, so a record is never sent twice.
/// A failed send releases the claim and leaves the record for catch-up; if
/// the release itself fails the notification is dropped rather than repeated.
/// Returns whether this call delivered the notification.
pub async fn notify_and_mark(
    notifier: &dyn PaymentNotifier,
    scope: &TenantScope,
    record: &PaymentRecord,
) -> bool {
    let now = OffsetDateTime::now_utc();
    // Stored timestamps keep microseconds
    let claimed_at = now.replace_microsecond(now.microsecond()).unwrap_or(now);

    match scope.db().mark_notified(record.id, claimed_at).await {
        Ok(true) => {}
        Ok(false) => return false,
        Err(e) => {
            tracing::warn!(
                tenant_id = %scope.tenant_id(),
                reference = %record.reference,
                error = %e,
                "Could not claim payment notification; left for catch-up"
            );
            return false;
        }
    }

    let error = match notifier.notify_payment(scope.tenant(), record).await {
        Ok(()) => return true,
        Err(NotifyError::NotConfigured) => None,
        Err(e) => Some(e),
    };

    if let Some(e) = &error {
        tracing::warn!(
            tenant_id = %scope.tenant_id(),
            reference = %record.reference,
            error = %e,
            "Payment notification failed; left for catch-up"
        );
    }
    if let Err(e) = scope.db().release_notified(record.id, claimed_at).await {
        tracing::error!(
            tenant_id = %scope.tenant_id(),
            reference = %record.reference,
            error = %e,
            "Notification claim not released; payment will not be notified"
        );
    }
    false
}
