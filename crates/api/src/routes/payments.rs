//! Tenant payment routes
//!
//! Every handler reads the bound tenant through `TenantContext`; the
//! reference and student id in the path only ever match that tenant's rows.

use axum::{
    extract::{Path, State},
    Json,
};
use campus_billing::{CheckoutRequest, ProviderSession};
use campus_shared::PaymentRecord;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    tenancy::TenantContext,
};

/// Payment as shown to school staff; the raw provider payload stays internal
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub reference: String,
    pub receipt_number: String,
    pub student_id: i64,
    pub class_id: Option<i64>,
    pub fee_rule_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
    pub notified: bool,
}

impl From<PaymentRecord> for PaymentView {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            status: record.status.as_str(),
            notified: record.notified_at.is_some(),
            reference: record.reference,
            receipt_number: record.receipt_number,
            student_id: record.student_id,
            class_id: record.class_id,
            fee_rule_id: record.fee_rule_id,
            amount_minor: record.amount_minor,
            currency: record.currency,
            paid_at: record.paid_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentView>,
    pub total: usize,
}

pub async fn get_payment(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(reference): Path<String>,
) -> ApiResult<Json<PaymentView>> {
    let record = state
        .billing
        .payments
        .find_by_reference(&scope, &reference)
        .await?
        .ok_or(ApiError::NotFound("payment"))?;
    Ok(Json(record.into()))
}

pub async fn list_student_payments(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Path(student_id): Path<i64>,
) -> ApiResult<Json<PaymentListResponse>> {
    let payments: Vec<PaymentView> = state
        .billing
        .payments
        .list_for_student(&scope, student_id)
        .await?
        .into_iter()
        .map(PaymentView::from)
        .collect();

    Ok(Json(PaymentListResponse {
        total: payments.len(),
        payments,
    }))
}

pub async fn initialize_checkout(
    State(state): State<AppState>,
    TenantContext(scope): TenantContext,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<Json<ProviderSession>> {
    let session = state
        .billing
        .payments
        .initialize_checkout(&scope, request)
        .await?;
    Ok(Json(session))
}
