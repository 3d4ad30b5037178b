//! Billing error types

use campus_shared::{ScopeError, StoreError};
use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("tenant scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("automatic payments are not enabled for this tenant")]
    AutomaticPaymentsDisabled,

    #[error("student not found: {0}")]
    StudentNotFound(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
