#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Campus Background Worker
//!
//! Scheduled jobs:
//! - Payment notification catch-up (every 5 minutes)
//! - Heartbeat (every 5 minutes)

mod config;
mod notifications;

use std::sync::Arc;
use std::time::Duration;

use campus_shared::{
    create_pool, CacheBackend, InMemoryCache, PgTenantDirectory, PgTenantStore, RedisCache,
    ScopeManager,
};
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::WorkerConfig;
use crate::notifications::NotificationCatchUp;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Campus Worker");

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    info!("Database pool created");

    let cache: Arc<dyn CacheBackend> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => Arc::new(InMemoryCache::new()),
    };
    let scopes = ScopeManager::new(Arc::new(PgTenantStore::new(pool.clone())), cache);
    let catch_up = Arc::new(NotificationCatchUp::new(
        Arc::new(PgTenantDirectory::new(pool)),
        scopes,
        config.notify.notifier()?,
    ));

    let scheduler = JobScheduler::new().await?;

    // Job 1: Notification catch-up
    // Cron: every 5 minutes, offset to avoid the heartbeat
    scheduler
        .add(Job::new_async("30 */5 * * * *", move |_uuid, _l| {
            let job = catch_up.clone();
            Box::pin(async move {
                info!("Running payment notification catch-up");
                job.run_once(OffsetDateTime::now_utc()).await;
            })
        })?)
        .await?;
    info!("Scheduled: Payment notification catch-up (every 5 minutes)");

    // Job 2: Heartbeat
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;
    info!("Campus Worker started successfully with {} scheduled jobs", 2);

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
