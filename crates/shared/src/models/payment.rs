//! Payment records and per-tenant payment settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use super::tenant::TenantId;

/// Status of a persisted payment. Only successful transactions are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
        }
    }
}

/// A reconciled payment, unique per (tenant, reference)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub student_id: i64,
    pub class_id: Option<i64>,
    pub fee_rule_id: Option<i64>,
    /// Integer amount in the currency's minor unit (kobo, cents)
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub status: PaymentStatus,
    pub provider_transaction_id: String,
    /// Raw provider verification payload, kept for audit
    pub provider_payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub paid_at: OffsetDateTime,
    pub receipt_number: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub notified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Insert shape for a payment record
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub student_id: i64,
    pub class_id: Option<i64>,
    pub fee_rule_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub provider_transaction_id: String,
    pub provider_payload: serde_json::Value,
    pub paid_at: OffsetDateTime,
    pub receipt_number: String,
}

impl NewPaymentRecord {
    pub fn into_record(self, tenant_id: TenantId, now: OffsetDateTime) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            tenant_id,
            student_id: self.student_id,
            class_id: self.class_id,
            fee_rule_id: self.fee_rule_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            reference: self.reference,
            status: PaymentStatus::Success,
            provider_transaction_id: self.provider_transaction_id,
            provider_payload: self.provider_payload,
            paid_at: self.paid_at,
            receipt_number: self.receipt_number,
            notified_at: None,
            created_at: now,
        }
    }
}

/// Result of an insert guarded by the (tenant, reference) uniqueness constraint
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(PaymentRecord),
    /// Another writer already recorded this reference
    Duplicate,
}

/// How a tenant collects fees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    Automatic,
    Manual,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Automatic => "automatic",
            PaymentMode::Manual => "manual",
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(PaymentMode::Automatic),
            "manual" => Ok(PaymentMode::Manual),
            other => Err(format!("unknown payment mode: {}", other)),
        }
    }
}

/// Per-tenant payment configuration
#[derive(Clone, PartialEq)]
pub struct PaymentSettings {
    pub mode: PaymentMode,
    /// Tenant's own provider secret key; never a platform-wide secret
    pub provider_secret: Option<String>,
    pub currency: String,
}

impl PaymentSettings {
    /// The secret to verify with, if webhook-originated payments are accepted
    pub fn automatic_secret(&self) -> Option<&str> {
        match self.mode {
            PaymentMode::Automatic => self
                .provider_secret
                .as_deref()
                .filter(|secret| !secret.is_empty()),
            PaymentMode::Manual => None,
        }
    }
}

impl fmt::Debug for PaymentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentSettings")
            .field("mode", &self.mode)
            .field(
                "provider_secret",
                &self.provider_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("currency", &self.currency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: PaymentMode, secret: Option<&str>) -> PaymentSettings {
        PaymentSettings {
            mode,
            provider_secret: secret.map(String::from),
            currency: "NGN".to_string(),
        }
    }

    #[test]
    fn test_automatic_secret_requires_automatic_mode() {
        assert_eq!(
            settings(PaymentMode::Automatic, Some("sk_live")).automatic_secret(),
            Some("sk_live")
        );
        assert_eq!(
            settings(PaymentMode::Manual, Some("sk_live")).automatic_secret(),
            None
        );
    }

    #[test]
    fn test_automatic_without_secret_is_not_configured() {
        assert_eq!(settings(PaymentMode::Automatic, None).automatic_secret(), None);
        assert_eq!(
            settings(PaymentMode::Automatic, Some("")).automatic_secret(),
            None
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", settings(PaymentMode::Automatic, Some("sk_live_abc")));
        assert!(!rendered.contains("sk_live_abc"));
    }
}
