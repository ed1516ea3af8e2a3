use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{OrderStatus, PaymentStatus};
use crate::models::{CommissionShare, Order, Payment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    CommissionPayable,
    CrmTimeline,
    ManualReviewRequired,
}

impl DomainEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CommissionPayable => "commission_payable",
            Self::CrmTimeline => "crm_timeline",
            Self::ManualReviewRequired => "manual_review_required",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "commission_payable" => Some(Self::CommissionPayable),
            "crm_timeline" => Some(Self::CrmTimeline),
            "manual_review_required" => Some(Self::ManualReviewRequired),
            _ => None,
        }
    }

    /// Bus channel the dispatcher publishes this kind on.
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::CommissionPayable => "commissions.payable",
            Self::CrmTimeline => "crm.timeline",
            Self::ManualReviewRequired => "alerts.manual_review",
        }
    }
}

/// A downstream notification waiting in the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Option<Uuid>,
    pub kind: DomainEventKind,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(kind: DomainEventKind, aggregate_id: Option<Uuid>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            kind,
            payload,
            attempts: 0,
            next_attempt_at: now,
            dispatched_at: None,
            last_error: None,
            occurred_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionPayableEvent {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub gateway_event_id: String,
    pub total_cents: i64,
    pub shares: Vec<CommissionShare>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmTimelineEvent {
    pub order_id: Uuid,
    pub customer_ref: String,
    pub gateway_event_id: String,
    pub order_from: Option<OrderStatus>,
    pub order_to: Option<OrderStatus>,
    pub payment_from: Option<PaymentStatus>,
    pub payment_to: Option<PaymentStatus>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualReviewEvent {
    pub order_id: Option<Uuid>,
    pub gateway_event_id: String,
    pub reason: String,
}

/// Follow-on events for an applied reconciliation. Stores append these in
/// the same transaction as the status change.
pub fn reconciliation_events(
    order: &Order,
    payment: &Payment,
    gateway_event_id: &str,
    order_change: Option<(OrderStatus, OrderStatus)>,
    payment_change: Option<(PaymentStatus, PaymentStatus)>,
) -> Vec<DomainEvent> {
    let mut events = Vec::new();

    if let Some((_, OrderStatus::Paid)) = order_change {
        match &payment.split {
            Some(split) => {
                let payable = CommissionPayableEvent {
                    order_id: order.id,
                    payment_id: payment.id,
                    gateway_event_id: gateway_event_id.to_string(),
                    total_cents: order.total_cents,
                    shares: split.commission_amounts(order.total_cents),
                };
                events.push(DomainEvent::new(
                    DomainEventKind::CommissionPayable,
                    Some(order.id),
                    serde_json::to_value(payable).unwrap_or_default(),
                ));
            }
            // Adopted charge with no local submission to take the split from.
            None => {
                let alert = ManualReviewEvent {
                    order_id: Some(order.id),
                    gateway_event_id: gateway_event_id.to_string(),
                    reason: format!(
                        "order paid through payment {} with no recorded split; commissions not accrued",
                        payment.id
                    ),
                };
                events.push(DomainEvent::new(
                    DomainEventKind::ManualReviewRequired,
                    Some(order.id),
                    serde_json::to_value(alert).unwrap_or_default(),
                ));
            }
        }
    }

    if order_change.is_some() || payment_change.is_some() {
        let timeline = CrmTimelineEvent {
            order_id: order.id,
            customer_ref: order.customer_ref.clone(),
            gateway_event_id: gateway_event_id.to_string(),
            order_from: order_change.map(|(from, _)| from),
            order_to: order_change.map(|(_, to)| to),
            payment_from: payment_change.map(|(from, _)| from),
            payment_to: payment_change.map(|(_, to)| to),
            occurred_at: Utc::now(),
        };
        events.push(DomainEvent::new(
            DomainEventKind::CrmTimeline,
            Some(order.id),
            serde_json::to_value(timeline).unwrap_or_default(),
        ));
    }

    events
}
