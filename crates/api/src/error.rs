//! API error type
//!
//! Response bodies are fixed and minimal: a machine code and a short message.
//! Internal details are logged, never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use campus_billing::BillingError;
use campus_shared::{DirectoryError, ScopeError, StoreError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Covers unknown, pending, declined and unresolved tenants alike
    #[error("tenant not found")]
    TenantNotFound,

    #[error("site access restricted")]
    SiteRestricted { reason: Option<String> },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("automatic payments are not enabled")]
    PaymentsDisabled,

    #[error("payment provider unavailable: {0}")]
    Gateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TenantNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SiteRestricted { .. } => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PaymentsDisabled => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::TenantNotFound => "tenant_not_found",
            ApiError::SiteRestricted { .. } => "site_restricted",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_error",
            ApiError::PaymentsDisabled => "automatic_payments_disabled",
            ApiError::Gateway(_) => "gateway_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::SiteRestricted { reason } => json!({
                "error": self.code(),
                "message": "This school's site is currently unavailable",
                "reason": reason,
            }),
            ApiError::Validation(message) => json!({
                "error": self.code(),
                "message": message,
            }),
            ApiError::Gateway(detail) => {
                tracing::warn!(error = %detail, "Payment provider call failed");
                json!({"error": self.code(), "message": "Payment provider unavailable"})
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                json!({"error": self.code(), "message": "Internal server error"})
            }
            _ => json!({"error": self.code(), "message": self.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::StudentNotFound(_) => ApiError::NotFound("student"),
            BillingError::InvalidRequest(message) => ApiError::Validation(message),
            BillingError::AutomaticPaymentsDisabled => ApiError::PaymentsDisabled,
            BillingError::Gateway(e) => ApiError::Gateway(e.to_string()),
            BillingError::Scope(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ScopeError> for ApiError {
    fn from(e: ScopeError) -> Self {
        match e {
            ScopeError::Unresolved | ScopeError::Inactive(_) => ApiError::TenantNotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
