use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures_util::{StreamExt, stream};
use tierpay_core::{DomainEvent, Outbox};
use tierpay_platform::{OutboxEnvelope, RedisBus};
use tracing::{info, warn};

const CONCURRENCY: usize = 8;
const RETRY_BASE_SECS: i64 = 5;
const RETRY_CAP_SECS: i64 = 300;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, envelope: &OutboxEnvelope) -> Result<()>;
}

#[async_trait]
impl Publisher for RedisBus {
    async fn publish(&self, channel: &str, envelope: &OutboxEnvelope) -> Result<()> {
        self.publish_json(channel, envelope).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Moves due outbox rows onto the bus. Delivery is at least once: a crash
/// between publish and `mark_dispatched` republishes the event.
pub struct OutboxDispatcher {
    outbox: Arc<dyn Outbox>,
    publisher: Arc<dyn Publisher>,
    batch_size: i64,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<dyn Outbox>, publisher: Arc<dyn Publisher>, batch_size: i64) -> Self {
        Self {
            outbox,
            publisher,
            batch_size,
        }
    }

    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let due = self.outbox.due_events(now, self.batch_size).await?;
        if due.is_empty() {
            return Ok(DispatchReport::default());
        }

        let outcomes: Vec<Result<bool>> = stream::iter(due)
            .map(|event| self.dispatch_one(event, now))
            .buffer_unordered(CONCURRENCY)
            .collect()
            .await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            if outcome? {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "outbox batch dispatched"
        );
        Ok(report)
    }

    /// `Ok(false)` when publishing failed and the event was rescheduled.
    async fn dispatch_one(&self, event: DomainEvent, now: DateTime<Utc>) -> Result<bool> {
        let channel = event.kind.channel();
        let envelope = OutboxEnvelope {
            event_id: event.id,
            kind: event.kind.as_str().to_string(),
            aggregate_id: event.aggregate_id,
            occurred_at: event.occurred_at,
            payload: event.payload.clone(),
        };

        match self.publisher.publish(channel, &envelope).await {
            Ok(()) => {
                self.outbox.mark_dispatched(event.id, Utc::now()).await?;
                Ok(true)
            }
            Err(err) => {
                let next = now + retry_delay(event.attempts);
                warn!(
                    event_id = %event.id,
                    kind = event.kind.as_str(),
                    attempts = event.attempts + 1,
                    "outbox publish failed, retrying at {next}: {err:#}"
                );
                self.outbox
                    .mark_attempt_failed(event.id, &format!("{err:#}"), next)
                    .await?;
                Ok(false)
            }
        }
    }
}

/// `base * 2^attempts`, capped.
pub fn retry_delay(attempts: i32) -> Duration {
    let exponent = u32::try_from(attempts).unwrap_or_default().min(16);
    let secs = RETRY_BASE_SECS
        .saturating_mul(1_i64 << exponent)
        .min(RETRY_CAP_SECS);
    Duration::seconds(secs)
}
