//! Collaborator seams. The surrounding application owns the data store;
//! this core only needs these operations from it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::lifecycle::{OrderStatus, PaymentStatus};
use crate::models::{
    Affiliate, Order, OrderStatusHistory, Payment, PaymentMethod, SplitAllocation,
    TransactionLogEntry, WebhookEvent, WebhookEventStatus,
};

#[async_trait]
pub trait AffiliateStore: Send + Sync {
    async fn find_by_referral_code(&self, code: &str) -> anyhow::Result<Option<Affiliate>>;
    async fn find_affiliate(&self, id: Uuid) -> anyhow::Result<Option<Affiliate>>;
}

/// Read side of the order subsystem. Soft-deleted orders are never returned.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: Uuid) -> anyhow::Result<Option<Order>>;
    async fn status_history(&self, order_id: Uuid) -> anyhow::Result<Vec<OrderStatusHistory>>;
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub split: SplitAllocation,
}

#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    Reserved(Payment),
    /// Another charge for the order is still pending or authorized.
    Conflict { existing: Uuid },
}

#[derive(Debug, Clone)]
pub struct GatewayCharge {
    pub gateway_payment_id: String,
    pub status: PaymentStatus,
    pub card_token: Option<String>,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a pending payment unless the order already has an open one.
    async fn reserve_payment(&self, payment: NewPayment) -> anyhow::Result<ReserveOutcome>;
    /// Records the gateway charge created for a reservation and returns the
    /// payment that now holds it.
    ///
    /// A webhook may have reached the charge first. If it bound the charge to
    /// this reservation, the reservation keeps the webhook's status. If it
    /// adopted the charge as a separate payment, that payment absorbs the
    /// charge and the empty reservation is removed. If the reservation was
    /// bound to another charge, a new payment is recorded for this one.
    async fn attach_gateway_charge(
        &self,
        payment_id: Uuid,
        charge: GatewayCharge,
    ) -> anyhow::Result<Payment>;
    async fn mark_payment_failed(&self, payment_id: Uuid, reason: &str) -> anyhow::Result<()>;
    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> anyhow::Result<Option<Payment>>;
    async fn payments_for_order(&self, order_id: Uuid) -> anyhow::Result<Vec<Payment>>;
}

#[derive(Debug, Clone)]
pub struct NewWebhookDelivery {
    pub gateway_event_id: String,
    pub signature: String,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery now holds the event id in `received`.
    Claimed { delivery_id: Uuid },
    /// Stored as `duplicate`; `holder` is the status of the delivery that owns the id.
    Duplicate {
        delivery_id: Uuid,
        holder: WebhookEventStatus,
    },
}

#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Atomic check-and-mark on the gateway event id.
    async fn claim_event(&self, delivery: NewWebhookDelivery) -> anyhow::Result<ClaimOutcome>;
    /// Marks a claimed delivery `rejected`, which releases the event id.
    async fn reject_event(&self, delivery_id: Uuid, reason: &str) -> anyhow::Result<()>;
    async fn deliveries(&self, gateway_event_id: &str) -> anyhow::Result<Vec<WebhookEvent>>;
}

#[derive(Debug, Clone)]
pub struct TransitionCommand {
    pub delivery_id: Uuid,
    pub gateway_event_id: String,
    pub gateway_payment_id: String,
    /// Order named by the charge's external reference, used to adopt unknown charges.
    pub order_ref: Option<Uuid>,
    pub method: Option<PaymentMethod>,
    pub amount_cents: Option<i64>,
    pub payment_status: Option<PaymentStatus>,
    pub order_status: Option<OrderStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionRejection {
    #[error("no payment for gateway id {gateway_payment_id} and no order to adopt it")]
    UnknownPayment { gateway_payment_id: String },

    #[error("order {order_id} not found")]
    OrderNotFound { order_id: Uuid },

    #[error("order transition {from} -> {to} is not allowed")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    #[error("payment transition {from} -> {to} is not allowed")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied {
        order_id: Uuid,
        payment_id: Uuid,
        order_change: Option<(OrderStatus, OrderStatus)>,
        payment_change: Option<(PaymentStatus, PaymentStatus)>,
        adopted: bool,
    },
    Rejected {
        order_id: Option<Uuid>,
        rejection: TransitionRejection,
    },
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// In one transaction: lock the order, validate against its persisted
    /// status, update order and payment, append history and follow-on events,
    /// and mark the delivery `applied`. A rejection leaves everything untouched
    /// and marks the delivery `rejected`.
    ///
    /// An unknown gateway id is first bound to the order's open reservation
    /// that has no charge yet (the charge was created but not attached); only
    /// without one is a new payment adopted.
    async fn apply_transition(&self, command: TransitionCommand)
    -> anyhow::Result<TransitionOutcome>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: TransactionLogEntry) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn enqueue(&self, event: DomainEvent) -> anyhow::Result<()>;
    async fn due_events(&self, now: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<DomainEvent>>;
    async fn mark_dispatched(&self, event_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Changes a command makes to an order and its payment, checked against the
/// persisted statuses. Stores call this while holding the order lock.
pub fn plan_reconciliation(
    order: &Order,
    payment: &Payment,
    command: &TransitionCommand,
) -> Result<
    (
        Option<(OrderStatus, OrderStatus)>,
        Option<(PaymentStatus, PaymentStatus)>,
    ),
    TransitionRejection,
> {
    let order_change = match command.order_status {
        Some(target) => crate::lifecycle::plan_order_transition(order.status, target)
            .map_err(|(from, to)| TransitionRejection::InvalidOrderTransition { from, to })?
            .map(|to| (order.status, to)),
        None => None,
    };

    let payment_change = match command.payment_status {
        Some(target) => crate::lifecycle::plan_payment_transition(payment.status, target)
            .map_err(|(from, to)| TransitionRejection::InvalidPaymentTransition { from, to })?
            .map(|to| (payment.status, to)),
        None => None,
    };

    Ok((order_change, payment_change))
}

/// Folds a created charge into the payment that holds it. A status the
/// payment already moved past through webhooks is kept.
pub fn absorb_gateway_charge(payment: &mut Payment, charge: &GatewayCharge) {
    payment.gateway_payment_id = Some(charge.gateway_payment_id.clone());
    if let Ok(Some(next)) = crate::lifecycle::plan_payment_transition(payment.status, charge.status)
    {
        payment.status = next;
    }
    if payment.card_token.is_none() {
        payment.card_token = charge.card_token.clone();
    }
    payment.updated_at = Utc::now();
}

/// A second payment cut from a reservation whose row a different charge
/// already claimed.
pub fn payment_from_reservation(reservation: &Payment, charge: &GatewayCharge) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id: reservation.order_id,
        gateway_payment_id: Some(charge.gateway_payment_id.clone()),
        status: charge.status,
        method: reservation.method,
        amount_cents: reservation.amount_cents,
        split: reservation.split.clone(),
        card_token: charge.card_token.clone(),
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// The order's reservation still waiting for its gateway id, if any.
pub fn awaiting_charge<'a>(
    payments: impl IntoIterator<Item = &'a Payment>,
    order_id: Uuid,
) -> Option<&'a Payment> {
    payments.into_iter().find(|payment| {
        payment.order_id == order_id
            && payment.gateway_payment_id.is_none()
            && payment.status.is_open()
    })
}

/// A payment record for a gateway charge this process never saw succeed,
/// typically one whose creation timed out on our side. The split is taken
/// from the order's most recent local submission.
pub fn adopted_payment(
    order: &Order,
    command: &TransitionCommand,
    prior_split: Option<SplitAllocation>,
) -> Payment {
    let now = Utc::now();
    Payment {
        id: Uuid::new_v4(),
        order_id: order.id,
        gateway_payment_id: Some(command.gateway_payment_id.clone()),
        status: PaymentStatus::Pending,
        method: command.method.unwrap_or(PaymentMethod::Pix),
        amount_cents: command.amount_cents.unwrap_or(order.total_cents),
        split: prior_split,
        card_token: None,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}
