use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Body returned to the gateway for every accepted delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub result: String,
    pub delivery_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub reason: Option<String>,
}

impl WebhookAck {
    pub fn applied(order_id: Uuid) -> Self {
        Self {
            result: "applied".to_string(),
            delivery_id: None,
            order_id: Some(order_id),
            reason: None,
        }
    }

    pub fn duplicate(delivery_id: Uuid) -> Self {
        Self {
            result: "duplicate".to_string(),
            delivery_id: Some(delivery_id),
            order_id: None,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            result: "rejected".to_string(),
            delivery_id: None,
            order_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// What the outbox worker publishes on a bus channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEnvelope {
    pub event_id: Uuid,
    pub kind: String,
    pub aggregate_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}
