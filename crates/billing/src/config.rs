//! Billing configuration from the environment

use std::sync::Arc;
use std::time::Duration;

use crate::error::{BillingError, BillingResult};
use crate::gateway::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::notify::{DisabledNotifier, HttpNotifier, PaymentNotifier};

#[derive(Clone, Default)]
pub struct NotifyConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        Self {
            url: non_empty_var("NOTIFY_URL"),
            api_key: non_empty_var("NOTIFY_API_KEY"),
        }
    }

    pub fn notifier(&self) -> BillingResult<Arc<dyn PaymentNotifier>> {
        match &self.url {
            Some(url) => {
                let notifier = HttpNotifier::new(url.clone(), self.api_key.clone())
                    .map_err(|e| BillingError::Config(e.to_string()))?;
                Ok(Arc::new(notifier))
            }
            None => {
                tracing::warn!("NOTIFY_URL not set; payment notifications are disabled");
                Ok(Arc::new(DisabledNotifier))
            }
        }
    }
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Clone)]
pub struct BillingConfig {
    /// Platform-wide secret the provider signs webhooks with
    pub webhook_secret: String,
    pub gateway_base_url: String,
    pub gateway_timeout: Duration,
    pub notify: NotifyConfig,
}

impl BillingConfig {
    pub fn from_env() -> BillingResult<Self> {
        let webhook_secret = non_empty_var("PAYSTACK_WEBHOOK_SECRET")
            .ok_or_else(|| BillingError::Config("PAYSTACK_WEBHOOK_SECRET is required".into()))?;
        let gateway_timeout = match std::env::var("PAYMENT_GATEWAY_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                BillingError::Config(format!("PAYMENT_GATEWAY_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            webhook_secret,
            gateway_base_url: non_empty_var("PAYMENT_GATEWAY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            gateway_timeout: Duration::from_secs(gateway_timeout),
            notify: NotifyConfig::from_env(),
        })
    }
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("gateway_base_url", &self.gateway_base_url)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("notify", &self.notify)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
