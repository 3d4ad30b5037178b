//! Error types for the tenancy core

use thiserror::Error;

use crate::models::{TenantId, TenantStatus};

/// Slug grammar violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlugError {
    #[error("slug is empty")]
    Empty,

    #[error("slug is {0} characters, maximum is 63")]
    TooLong(usize),

    #[error("slug '{0}' is reserved")]
    Reserved(String),

    #[error("slug contains invalid character '{0}'")]
    InvalidCharacter(char),

    #[error("slug must start and end with a letter or digit")]
    EdgeHyphen,
}

/// Tenant directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("tenant not found: {0}")]
    NotFound(TenantId),

    #[error("tenant slug already taken: {0}")]
    SlugTaken(String),

    #[error("cannot {action} a tenant that is {from}")]
    InvalidTransition {
        from: TenantStatus,
        action: &'static str,
    },

    #[error("database error: {0}")]
    Database(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Tenant-scoped storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("file storage error: {0}")]
    Files(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        DirectoryError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Cache(e.to_string())
    }
}

/// Scope binding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// No tenant is bound to the current execution context
    #[error("tenant not resolved")]
    Unresolved,

    /// A scope is already bound; nested binding is never allowed
    #[error("tenant scope already bound to {active}, refusing to bind {requested}")]
    AlreadyBound {
        active: TenantId,
        requested: TenantId,
    },

    /// `enter_scope` was called outside a scope context
    #[error("no scope context for this execution")]
    NoContext,

    /// Only active tenants can be bound
    #[error("tenant {0} is not active")]
    Inactive(TenantId),
}

/// Tenant lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
