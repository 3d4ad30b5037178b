//! Cache backends and the tenant key namespace
//!
//! Request code only touches the cache through `TenantCache`, which prefixes
//! every key with `tenant:{id}:`; two tenants can never read or evict each
//! other's entries.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::models::TenantId;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    /// Delete every key starting with `prefix`; returns keys removed
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64>;
}

/// Redis-backed cache
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!("Redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", prefix))
            .query_async(&mut conn)
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        Ok(removed)
    }
}

/// Process-local cache for tests and single-node development
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

/// Cache key namespace for one tenant
pub fn tenant_prefix(tenant: TenantId) -> String {
    format!("tenant:{}:", tenant)
}

/// Cache handle bound to one tenant
#[derive(Clone)]
pub struct TenantCache {
    tenant: TenantId,
    prefix: String,
    backend: Arc<dyn CacheBackend>,
}

impl TenantCache {
    pub fn new(tenant: TenantId, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            tenant,
            prefix: tenant_prefix(tenant),
            backend,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant
    }

    /// Fully-qualified key for a tenant-relative key
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.backend.get(&self.key(key)).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.backend.set(&self.key(key), value, ttl).await
    }

    pub async fn forget(&self, key: &str) -> StoreResult<()> {
        self.backend.delete(&self.key(key)).await
    }

    /// Drop every entry in this tenant's namespace
    pub async fn flush(&self) -> StoreResult<u64> {
        self.backend.delete_prefix(&self.prefix).await
    }
}

impl std::fmt::Debug for TenantCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCache")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Key for a student's cached fee summary
pub fn fee_summary_key(student_id: i64) -> String {
    format!("fee_summary:{}", student_id)
}
