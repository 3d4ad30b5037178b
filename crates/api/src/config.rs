//! Server configuration

use campus_billing::{BillingConfig, BillingError};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_BASE_DOMAINS: &str = "campus.app,campus.test";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error(transparent)]
    Billing(#[from] BillingError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Domains tenant subdomains hang off, e.g. `campus.app`
    pub tenant_base_domains: Vec<String>,
    /// In-memory cache when unset
    pub redis_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub billing: BillingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            tenant_base_domains: split_list(
                &var("TENANT_BASE_DOMAINS").unwrap_or_else(|| DEFAULT_BASE_DOMAINS.to_string()),
            ),
            redis_url: var("REDIS_URL"),
            allowed_origins: split_list(
                &var("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            billing: BillingConfig::from_env()?,
        })
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(
            split_list(" campus.app, ,campus.test ,"),
            vec!["campus.app".to_string(), "campus.test".to_string()]
        );
    }
}
