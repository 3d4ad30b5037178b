//! Payment provider gateway
//!
//! Client for a Paystack-compatible provider API. Every call authenticates
//! with the calling tenant's own secret key; there is no platform-wide key.
//! Calls are never retried here: the reconciler surfaces a failure and the
//! webhook delivery mechanism retries the whole event.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Malformed(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Provider-side transaction status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
    Other(String),
}

impl TransactionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "abandoned" => Self::Abandoned,
            "pending" | "ongoing" | "processing" | "queued" => Self::Pending,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
            Self::Pending => "pending",
            Self::Other(s) => s,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative view of a transaction, as reported by the provider
#[derive(Debug, Clone)]
pub struct VerifiedTransaction {
    pub status: TransactionStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub provider_transaction_id: String,
    pub paid_at: Option<OffsetDateTime>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub email: String,
    /// Minor currency units
    pub amount: i64,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn verify(&self, secret: &str, reference: &str)
        -> Result<VerifiedTransaction, GatewayError>;

    async fn initialize(
        &self,
        secret: &str,
        request: &InitializeRequest,
    ) -> Result<ProviderSession, GatewayError>;
}

/// `{status, message, data}` wrapper around every provider response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    id: serde_json::Value,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    paid_at: Option<String>,
}

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Rejected(envelope.message));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Malformed("response has no data".to_string()))
    }
}

fn transaction_id(id: &serde_json::Value) -> Result<String, GatewayError> {
    match id {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(GatewayError::Malformed(
            "transaction id is missing".to_string(),
        )),
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn verify(
        &self,
        secret: &str,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let response = self
            .client
            .get(&url)
            .bearer_auth(secret)
            .header("Accept", "application/json")
            .send()
            .await?;

        let raw: serde_json::Value = Self::read_envelope(response).await?;
        let data: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let paid_at = match data.paid_at.as_deref() {
            Some(ts) => Some(
                OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339)
                    .map_err(|e| GatewayError::Malformed(format!("paid_at: {}", e)))?,
            ),
            None => None,
        };

        Ok(VerifiedTransaction {
            status: TransactionStatus::parse(&data.status),
            amount_minor: data.amount,
            currency: data.currency,
            provider_transaction_id: transaction_id(&data.id)?,
            paid_at,
            raw,
        })
    }

    async fn initialize(
        &self,
        secret: &str,
        request: &InitializeRequest,
    ) -> Result<ProviderSession, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(secret)
            .json(request)
            .send()
            .await?;

        Self::read_envelope(response).await
    }
}
