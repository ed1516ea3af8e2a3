mod dispatcher;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tierpay_platform::{OutboxSettings, PgStore, RedisBus, ServiceConfig, connect_database};
use tracing::{error, info};

use crate::dispatcher::OutboxDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tierpay_ops=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let settings = OutboxSettings::from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let dispatcher = OutboxDispatcher::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(redis),
        settings.batch_size,
    );

    info!(
        poll_ms = settings.poll_interval.as_millis() as u64,
        batch_size = settings.batch_size,
        "outbox dispatcher started"
    );

    let mut ticker = tokio::time::interval(settings.poll_interval);
    loop {
        ticker.tick().await;
        if let Err(err) = dispatcher.dispatch_due(Utc::now()).await {
            error!("outbox dispatch failed: {err:#}");
        }
    }
}
