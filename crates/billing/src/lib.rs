// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Campus Billing Module
//!
//! Handles school fee payments through a Paystack-compatible provider.
//!
//! ## Features
//!
//! - **Webhook Reconciliation**: Verify signed callbacks, re-verify with the
//!   provider, and record each payment exactly once under its tenant
//! - **Checkout**: Initialize provider checkouts with the tenant's own secret
//! - **Payment Queries**: Look up a tenant's payments by reference or student
//! - **Notifications**: Hand recorded payments to the receipt mailer

pub mod config;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod payments;
pub mod signature;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Config
pub use config::{BillingConfig, NotifyConfig};

// Error
pub use error::{BillingError, BillingResult};

// Gateway
pub use gateway::{
    GatewayError, HttpPaymentGateway, InitializeRequest, PaymentGateway, ProviderSession,
    TransactionStatus, VerifiedTransaction,
};

// Notify
pub use notify::{DisabledNotifier, HttpNotifier, NotifyError, PaymentNotifier};

// Payments
pub use payments::{CheckoutRequest, PaymentService};

// Webhooks
pub use webhooks::{
    notify_and_mark, receipt_number, ChargeData, PaymentMetadata, ReconcileError,
    ReconcileOutcome, WebhookEvent, WebhookReconciler,
};

use campus_shared::{ScopeManager, TenantDirectory};
use std::sync::Arc;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn PaymentNotifier>,
    pub payments: PaymentService,
    pub webhooks: WebhookReconciler,
}

impl BillingService {
    /// Create a billing service talking to the configured provider
    pub fn new(
        config: &BillingConfig,
        directory: Arc<dyn TenantDirectory>,
        scopes: ScopeManager,
    ) -> BillingResult<Self> {
        let gateway = HttpPaymentGateway::new(&config.gateway_base_url, config.gateway_timeout)?;
        let notifier = config.notify.notifier()?;
        Ok(Self::with_components(
            config.webhook_secret.as_bytes(),
            directory,
            scopes,
            Arc::new(gateway),
            notifier,
        ))
    }

    /// Create a billing service from explicit components
    pub fn with_components(
        webhook_secret: &[u8],
        directory: Arc<dyn TenantDirectory>,
        scopes: ScopeManager,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
    ) -> Self {
        Self {
            payments: PaymentService::new(gateway.clone()),
            webhooks: WebhookReconciler::new(
                webhook_secret,
                directory,
                scopes,
                gateway.clone(),
                notifier.clone(),
            ),
            gateway,
            notifier,
        }
    }
}
