//! Payment notification boundary
//!
//! Receipts are rendered and mailed by an external service. This module only
//! hands it the payment; `notified_at` is set by the caller once a send
//! succeeds, and the worker picks up anything left unset.

use async_trait::async_trait;
use campus_shared::{PaymentRecord, Tenant};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifications are not configured")]
    NotConfigured,

    #[error("notification request failed: {0}")]
    Transport(String),

    #[error("notification service returned HTTP {0}")]
    Http(u16),
}

#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn notify_payment(
        &self,
        tenant: &Tenant,
        payment: &PaymentRecord,
    ) -> Result<(), NotifyError>;
}

/// Used when no notification service is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl PaymentNotifier for DisabledNotifier {
    async fn notify_payment(
        &self,
        _tenant: &Tenant,
        _payment: &PaymentRecord,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

#[derive(Debug, Serialize)]
struct PaymentNotification<'a> {
    template: &'static str,
    tenant_id: i64,
    tenant_slug: &'a str,
    school_name: &'a str,
    student_id: i64,
    reference: &'a str,
    receipt_number: &'a str,
    amount_minor: i64,
    currency: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    paid_at: time::OffsetDateTime,
}

/// Posts payment notifications to the mail service
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    url: String,
    api_key: Option<String>,
    attempts: usize,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            attempts: 3,
        })
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    async fn send_once(&self, body: &PaymentNotification<'_>) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Http(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentNotifier for HttpNotifier {
    async fn notify_payment(
        &self,
        tenant: &Tenant,
        payment: &PaymentRecord,
    ) -> Result<(), NotifyError> {
        let body = PaymentNotification {
            template: "payment_receipt",
            tenant_id: tenant.id.get(),
            tenant_slug: tenant.slug.as_str(),
            school_name: &tenant.name,
            student_id: payment.student_id,
            reference: &payment.reference,
            receipt_number: &payment.receipt_number,
            amount_minor: payment.amount_minor,
            currency: &payment.currency,
            paid_at: payment.paid_at,
        };

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.attempts.saturating_sub(1));
        Retry::spawn(strategy, || self.send_once(&body)).await?;

        tracing::debug!(
            tenant_id = %tenant.id,
            reference = %payment.reference,
            "Payment notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_shared::{
        InMemoryTenantDirectory, NewPaymentRecord, NewTenant, TenantSlug,
    };
    use serde_json::json;
    use time::OffsetDateTime;

    async fn fixture() -> (Tenant, PaymentRecord) {
        let directory = InMemoryTenantDirectory::new();
        let tenant = directory
            .insert_active(NewTenant {
                slug: TenantSlug::parse("greenwood").unwrap(),
                name: "Greenwood Academy".to_string(),
                contact_email: "bursar@greenwood.example".to_string(),
            })
            .await
            .unwrap();
        let record = NewPaymentRecord {
            student_id: 42,
            class_id: None,
            fee_rule_id: None,
            amount_minor: 500_000,
            currency: "NGN".to_string(),
            reference: "abc123".to_string(),
            provider_transaction_id: "4099260516".to_string(),
            provider_payload: json!({}),
            paid_at: OffsetDateTime::now_utc(),
            receipt_number: "RCT-ABC123".to_string(),
        }
        .into_record(tenant.id, OffsetDateTime::now_utc());
        (tenant, record)
    }

    #[tokio::test]
    async fn test_http_notifier_posts_receipt() {
        let (tenant, record) = fixture().await;
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_header("authorization", "Bearer mail-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "tenant_slug": "greenwood",
                "receipt_number": "RCT-ABC123",
                "student_id": 42
            })))
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let notifier =
            HttpNotifier::new(format!("{}/notify", server.url()), Some("mail-key".into()))
                .unwrap();
        notifier.notify_payment(&tenant, &record).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_notifier_retries_then_fails() {
        let (tenant, record) = fixture().await;
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let notifier = HttpNotifier::new(format!("{}/notify", server.url()), None)
            .unwrap()
            .with_attempts(3);
        let err = notifier.notify_payment(&tenant, &record).await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(503)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_notifier() {
        let (tenant, record) = fixture().await;
        assert!(matches!(
            DisabledNotifier.notify_payment(&tenant, &record).await,
            Err(NotifyError::NotConfigured)
        ));
    }
}
