// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Campus Shared
//!
//! Tenancy core shared by the API server and the worker.
//!
//! ## Components
//!
//! - **Models**: tenants, slugs, payment records and settings
//! - **Resolver**: request identity (override header, query, host) to slug
//! - **Directory**: the registry of tenants and their status
//! - **Scope**: task-local tenant binding with tenant-bound store and cache handles
//! - **Lifecycle**: registration, approval, decline, restriction, deletion

pub mod cache;
pub mod db;
pub mod directory;
pub mod error;
pub mod files;
pub mod lifecycle;
pub mod models;
pub mod resolver;
pub mod scope;
pub mod store;

pub use cache::{CacheBackend, InMemoryCache, RedisCache, TenantCache};
pub use db::{create_migration_pool, create_pool, run_migrations};
pub use directory::{find_resolvable, InMemoryTenantDirectory, PgTenantDirectory, TenantDirectory};
pub use error::{
    DirectoryError, DirectoryResult, LifecycleError, LifecycleResult, ScopeError, SlugError,
    StoreError, StoreResult,
};
pub use files::{LocalFileStore, TenantFileStore};
pub use lifecycle::{
    AdminCredentials, ApprovedTenant, StoreProvisioner, TenantLifecycle, TenantProvisioner,
};
pub use models::*;
pub use resolver::{RequestIdentity, ResolutionSource, TenantResolver};
pub use scope::{current_scope, scoped_context, ScopeGuard, ScopeManager, TenantScope};
pub use store::{InMemoryTenantStore, PgTenantStore, TenantDb, TenantStore};
