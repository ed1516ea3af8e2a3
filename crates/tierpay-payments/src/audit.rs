use std::sync::Arc;

use serde_json::Value;
use tierpay_core::{AuditLog, TransactionLogEntry};
use tracing::warn;
use uuid::Uuid;

use crate::redact::redact;

/// Writes audit rows without ever failing the caller. A store error becomes a
/// warning; the payment flow continues.
#[derive(Clone)]
pub struct AuditRecorder {
    log: Arc<dyn AuditLog>,
}

impl AuditRecorder {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }

    pub async fn record(&self, entry: TransactionLogEntry) {
        let kind = entry.kind.clone();
        if let Err(err) = self.log.record(entry).await {
            warn!(kind = %kind, "audit log write failed: {err:#}");
        }
    }

    /// Records one request/response pair, redacting both bodies.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_exchange(
        &self,
        kind: &str,
        request: &Value,
        response: &Value,
        success: bool,
        http_status: Option<u16>,
        order_ref: Option<Uuid>,
        payment_ref: Option<Uuid>,
    ) {
        let mut entry = TransactionLogEntry::new(kind);
        entry.request = redact(request);
        entry.response = redact(response);
        entry.success = success;
        entry.http_status = http_status;
        entry.order_ref = order_ref;
        entry.payment_ref = payment_ref;
        self.record(entry).await;
    }
}
