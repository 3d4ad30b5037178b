//! Tenant payment queries and checkout initialization
//!
//! Every operation takes the caller's `TenantScope`; reads and the
//! provider secret both come from that tenant only.

use campus_shared::{PaymentRecord, TenantScope};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{InitializeRequest, PaymentGateway, ProviderSession};

/// Random part of a generated reference, in hex characters
const REFERENCE_SUFFIX_LEN: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub student_id: i64,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub fee_rule_id: Option<i64>,
    /// Minor currency units
    pub amount_minor: i64,
    pub payer_email: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub async fn find_by_reference(
        &self,
        scope: &TenantScope,
        reference: &str,
    ) -> BillingResult<Option<PaymentRecord>> {
        Ok(scope.db().find_payment(reference).await?)
    }

    /// Payments for one of the tenant's students, newest first
    pub async fn list_for_student(
        &self,
        scope: &TenantScope,
        student_id: i64,
    ) -> BillingResult<Vec<PaymentRecord>> {
        if !scope.db().student_exists(student_id).await? {
            return Err(BillingError::StudentNotFound(student_id));
        }
        Ok(scope.db().list_student_payments(student_id).await?)
    }

    /// Start a provider checkout whose webhook routes back to this tenant
    pub async fn initialize_checkout(
        &self,
        scope: &TenantScope,
        request: CheckoutRequest,
    ) -> BillingResult<ProviderSession> {
        if request.amount_minor <= 0 {
            return Err(BillingError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }
        if !request.payer_email.contains('@') {
            return Err(BillingError::InvalidRequest(
                "payer email is invalid".to_string(),
            ));
        }

        let db = scope.db();
        if !db.student_exists(request.student_id).await? {
            return Err(BillingError::StudentNotFound(request.student_id));
        }
        if let Some(class_id) = request.class_id {
            if !db.class_exists(class_id).await? {
                return Err(BillingError::InvalidRequest(format!(
                    "class {} not found",
                    class_id
                )));
            }
        }
        if let Some(fee_rule_id) = request.fee_rule_id {
            if !db.fee_rule_exists(fee_rule_id).await? {
                return Err(BillingError::InvalidRequest(format!(
                    "fee rule {} not found",
                    fee_rule_id
                )));
            }
        }

        let settings = db.payment_settings().await?;
        let settings = settings.ok_or(BillingError::AutomaticPaymentsDisabled)?;
        let secret = settings
            .automatic_secret()
            .ok_or(BillingError::AutomaticPaymentsDisabled)?;

        let slug = scope.tenant().slug.as_str();
        let reference = generate_reference(slug);
        let provider_request = InitializeRequest {
            email: request.payer_email.clone(),
            amount: request.amount_minor,
            reference: reference.clone(),
            currency: Some(settings.currency.clone()),
            callback_url: request.callback_url,
            metadata: json!({
                "school_subdomain": slug,
                "student_id": request.student_id,
                "class_id": request.class_id,
                "fee_rule_id": request.fee_rule_id,
                "payer_email": request.payer_email,
            }),
        };

        let session = self.gateway.initialize(secret, &provider_request).await?;
        tracing::info!(
            tenant_id = %scope.tenant_id(),
            reference = %reference,
            student_id = request.student_id,
            amount_minor = request.amount_minor,
            "Checkout initialized"
        );
        Ok(session)
    }
}

/// `{slug}-{random hex}`; unique across tenants because the slug is
pub fn generate_reference(slug: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(REFERENCE_SUFFIX_LEN)
        .collect();
    format!("{}-{}", slug, suffix)
}
