//! Tenant model
//!
//! A tenant is one school. Its numeric id is the isolation key for every
//! tenant-scoped row and cache entry; its slug is the subdomain it is routed by.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::SlugError;

/// Maximum length of a DNS label, and therefore of a slug
pub const MAX_SLUG_LEN: usize = 63;

/// Slugs that can never belong to a tenant
pub const RESERVED_SLUGS: &[&str] = &["www", "api"];

/// Opaque numeric tenant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl TenantId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated routing slug (the tenant's subdomain)
///
/// Lowercase ASCII letters and digits with optional interior hyphens,
/// 1 to 63 characters, starting and ending with an alphanumeric character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TenantSlug(String);

impl TenantSlug {
    /// Normalize to lowercase and validate against the slug grammar
    pub fn parse(raw: &str) -> Result<Self, SlugError> {
        let slug = raw.trim().to_ascii_lowercase();

        if slug.is_empty() {
            return Err(SlugError::Empty);
        }
        if slug.len() > MAX_SLUG_LEN {
            return Err(SlugError::TooLong(slug.len()));
        }
        if RESERVED_SLUGS.contains(&slug.as_str()) {
            return Err(SlugError::Reserved(slug));
        }
        if let Some(c) = slug
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(SlugError::InvalidCharacter(c));
        }
        if slug.starts_with('-') || slug.ends_with('-') {
            return Err(SlugError::EdgeHyphen);
        }

        Ok(Self(slug))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantSlug {
    type Err = SlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for TenantSlug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Tenant lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Active,
    Declined,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Active => "active",
            TenantStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TenantStatus::Pending),
            "active" => Ok(TenantStatus::Active),
            "declined" => Ok(TenantStatus::Declined),
            other => Err(format!("unknown tenant status: {}", other)),
        }
    }
}

/// A login or site restriction flag with an optional displayed reason
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub blocked: bool,
    pub reason: Option<String>,
}

impl Restriction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

/// One customer account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: TenantSlug,
    pub name: String,
    pub contact_email: String,
    pub status: TenantStatus,
    pub login_restriction: Restriction,
    pub site_restriction: Restriction,
    pub decline_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Tenant {
    /// Only active tenants may receive traffic
    pub fn is_resolvable(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn is_site_blocked(&self) -> bool {
        self.site_restriction.blocked
    }

    pub fn is_login_blocked(&self) -> bool {
        self.login_restriction.blocked
    }
}

/// Self-registration request for a new tenant
#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub slug: TenantSlug,
    pub name: String,
    pub contact_email: String,
}
