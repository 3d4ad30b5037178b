//! Worker configuration

use campus_billing::NotifyConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// In-memory cache when unset
    pub redis_url: Option<String>,
    pub notify: NotifyConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(WorkerConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            redis_url: std::env::var("REDIS_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            notify: NotifyConfig::from_env(),
        })
    }
}
