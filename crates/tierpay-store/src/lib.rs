//! In-process implementation of every storage seam.
//!
//! All state sits behind one lock so that the multi-record operations
//! (claiming an event id, reserving a charge slot, applying a transition)
//! are atomic in the same way the Postgres store makes them atomic.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tierpay_core::{
    Affiliate, AffiliateStore, AuditLog, ClaimOutcome, DomainEvent, GatewayCharge, NewPayment,
    NewWebhookDelivery, Order, OrderStatus, OrderStatusHistory, OrderStore, Outbox, Payment,
    PaymentStatus, PaymentStore, ReconciliationStore, ReserveOutcome, TransactionLogEntry,
    TransitionCommand, TransitionOutcome, TransitionRejection, WebhookEvent, WebhookEventStatus,
    WebhookEventStore, absorb_gateway_charge, adopted_payment, awaiting_charge,
    payment_from_reservation, plan_reconciliation, reconciliation_events,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    affiliates: HashMap<Uuid, Affiliate>,
    orders: HashMap<Uuid, Order>,
    payments: Vec<Payment>,
    history: Vec<OrderStatusHistory>,
    deliveries: Vec<WebhookEvent>,
    audit: Vec<TransactionLogEntry>,
    outbox: Vec<DomainEvent>,
}

impl MemoryState {
    fn live_order(&self, id: Uuid) -> Option<&Order> {
        self.orders.get(&id).filter(|order| order.deleted_at.is_none())
    }

    fn delivery_mut(&mut self, id: Uuid) -> anyhow::Result<&mut WebhookEvent> {
        self.deliveries
            .iter_mut()
            .find(|delivery| delivery.id == id)
            .with_context(|| format!("webhook delivery {id} not found"))
    }

    fn payment_mut(&mut self, id: Uuid) -> anyhow::Result<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|payment| payment.id == id)
            .with_context(|| format!("payment {id} not found"))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_affiliate(&self, affiliate: Affiliate) {
        self.state
            .write()
            .await
            .affiliates
            .insert(affiliate.id, affiliate);
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.write().await.orders.insert(order.id, order);
    }

    /// Order subsystem stand-in for moves this core does not drive (fulfilment).
    pub async fn set_order_status(&self, order_id: Uuid, status: OrderStatus) {
        if let Some(order) = self.state.write().await.orders.get_mut(&order_id) {
            order.status = status;
            order.updated_at = Utc::now();
        }
    }

    pub async fn soft_delete_order(&self, order_id: Uuid) {
        if let Some(order) = self.state.write().await.orders.get_mut(&order_id) {
            order.deleted_at = Some(Utc::now());
        }
    }

    pub async fn audit_entries(&self) -> Vec<TransactionLogEntry> {
        self.state.read().await.audit.clone()
    }

    pub async fn outbox_events(&self) -> Vec<DomainEvent> {
        self.state.read().await.outbox.clone()
    }

    pub async fn all_deliveries(&self) -> Vec<WebhookEvent> {
        self.state.read().await.deliveries.clone()
    }
}

#[async_trait]
impl AffiliateStore for InMemoryStore {
    async fn find_by_referral_code(&self, code: &str) -> anyhow::Result<Option<Affiliate>> {
        let state = self.state.read().await;
        Ok(state
            .affiliates
            .values()
            .find(|affiliate| affiliate.referral_code == code)
            .cloned())
    }

    async fn find_affiliate(&self, id: Uuid) -> anyhow::Result<Option<Affiliate>> {
        Ok(self.state.read().await.affiliates.get(&id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_order(&self, id: Uuid) -> anyhow::Result<Option<Order>> {
        Ok(self.state.read().await.live_order(id).cloned())
    }

    async fn status_history(&self, order_id: Uuid) -> anyhow::Result<Vec<OrderStatusHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn reserve_payment(&self, payment: NewPayment) -> anyhow::Result<ReserveOutcome> {
        let mut state = self.state.write().await;

        if let Some(existing) = state
            .payments
            .iter()
            .find(|existing| existing.order_id == payment.order_id && existing.status.is_open())
        {
            return Ok(ReserveOutcome::Conflict {
                existing: existing.id,
            });
        }

        let now = Utc::now();
        let reserved = Payment {
            id: Uuid::new_v4(),
            order_id: payment.order_id,
            gateway_payment_id: None,
            status: PaymentStatus::Pending,
            method: payment.method,
            amount_cents: payment.amount_cents,
            split: Some(payment.split),
            card_token: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(reserved.clone());

        Ok(ReserveOutcome::Reserved(reserved))
    }

    async fn attach_gateway_charge(
        &self,
        payment_id: Uuid,
        charge: GatewayCharge,
    ) -> anyhow::Result<Payment> {
        let mut state = self.state.write().await;
        let reservation = state.payment_mut(payment_id)?.clone();

        let holder = state
            .payments
            .iter()
            .position(|payment| {
                payment.gateway_payment_id.as_deref() == Some(charge.gateway_payment_id.as_str())
            });

        match holder {
            Some(index) => {
                let payment = &mut state.payments[index];
                absorb_gateway_charge(payment, &charge);
                let held = payment.clone();
                if held.id != reservation.id && reservation.gateway_payment_id.is_none() {
                    state.payments.retain(|payment| payment.id != reservation.id);
                }
                Ok(held)
            }
            None if reservation.gateway_payment_id.is_none() => {
                let payment = state.payment_mut(payment_id)?;
                absorb_gateway_charge(payment, &charge);
                Ok(payment.clone())
            }
            None => {
                let payment = payment_from_reservation(&reservation, &charge);
                state.payments.push(payment.clone());
                Ok(payment)
            }
        }
    }

    async fn mark_payment_failed(&self, payment_id: Uuid, reason: &str) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let payment = state.payment_mut(payment_id)?;
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.to_string());
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> anyhow::Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .find(|payment| payment.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .cloned())
    }

    async fn payments_for_order(&self, order_id: Uuid) -> anyhow::Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|payment| payment.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryStore {
    async fn claim_event(&self, delivery: NewWebhookDelivery) -> anyhow::Result<ClaimOutcome> {
        let mut state = self.state.write().await;

        let holder = state
            .deliveries
            .iter()
            .find(|existing| {
                existing.gateway_event_id == delivery.gateway_event_id
                    && existing.status.holds_claim()
            })
            .map(|existing| existing.status);

        let delivery_id = Uuid::new_v4();
        let status = if holder.is_some() {
            WebhookEventStatus::Duplicate
        } else {
            WebhookEventStatus::Received
        };

        state.deliveries.push(WebhookEvent {
            id: delivery_id,
            gateway_event_id: delivery.gateway_event_id,
            signature: delivery.signature,
            raw_payload: delivery.raw_payload,
            status,
            reason: None,
            received_at: delivery.received_at,
        });

        Ok(match holder {
            Some(holder) => ClaimOutcome::Duplicate {
                delivery_id,
                holder,
            },
            None => ClaimOutcome::Claimed { delivery_id },
        })
    }

    async fn reject_event(&self, delivery_id: Uuid, reason: &str) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let delivery = state.delivery_mut(delivery_id)?;
        delivery.status = WebhookEventStatus::Rejected;
        delivery.reason = Some(reason.to_string());
        Ok(())
    }

    async fn deliveries(&self, gateway_event_id: &str) -> anyhow::Result<Vec<WebhookEvent>> {
        let state = self.state.read().await;
        Ok(state
            .deliveries
            .iter()
            .filter(|delivery| delivery.gateway_event_id == gateway_event_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn apply_transition(
        &self,
        command: TransitionCommand,
    ) -> anyhow::Result<TransitionOutcome> {
        let mut state = self.state.write().await;

        let existing = state
            .payments
            .iter()
            .find(|payment| {
                payment.gateway_payment_id.as_deref() == Some(command.gateway_payment_id.as_str())
            })
            .cloned();

        let awaiting = match (&existing, command.order_ref) {
            (None, Some(order_id)) => awaiting_charge(&state.payments, order_id).cloned(),
            _ => None,
        };

        let (payment, adopted) = match existing.or(awaiting) {
            Some(mut payment) => {
                payment.gateway_payment_id = Some(command.gateway_payment_id.clone());
                (payment, false)
            }
            None => {
                let adoption = match command.order_ref {
                    Some(order_id) => match state.live_order(order_id) {
                        Some(order) => {
                            let prior_split = state
                                .payments
                                .iter()
                                .rev()
                                .filter(|payment| payment.order_id == order_id)
                                .find_map(|payment| payment.split.clone());
                            Ok(adopted_payment(order, &command, prior_split))
                        }
                        None => Err(TransitionRejection::OrderNotFound { order_id }),
                    },
                    None => Err(TransitionRejection::UnknownPayment {
                        gateway_payment_id: command.gateway_payment_id.clone(),
                    }),
                };

                match adoption {
                    Ok(payment) => (payment, true),
                    Err(rejection) => {
                        let delivery = state.delivery_mut(command.delivery_id)?;
                        delivery.status = WebhookEventStatus::Rejected;
                        delivery.reason = Some(rejection.to_string());
                        return Ok(TransitionOutcome::Rejected {
                            order_id: command.order_ref,
                            rejection,
                        });
                    }
                }
            }
        };

        let Some(order) = state.live_order(payment.order_id).cloned() else {
            let rejection = TransitionRejection::OrderNotFound {
                order_id: payment.order_id,
            };
            let delivery = state.delivery_mut(command.delivery_id)?;
            delivery.status = WebhookEventStatus::Rejected;
            delivery.reason = Some(rejection.to_string());
            return Ok(TransitionOutcome::Rejected {
                order_id: Some(payment.order_id),
                rejection,
            });
        };

        let (order_change, payment_change) = match plan_reconciliation(&order, &payment, &command)
        {
            Ok(plan) => plan,
            Err(rejection) => {
                let delivery = state.delivery_mut(command.delivery_id)?;
                delivery.status = WebhookEventStatus::Rejected;
                delivery.reason = Some(rejection.to_string());
                return Ok(TransitionOutcome::Rejected {
                    order_id: Some(order.id),
                    rejection,
                });
            }
        };

        let now = Utc::now();
        let mut payment = payment;
        if let Some((_, to)) = payment_change {
            payment.status = to;
            payment.updated_at = now;
        }
        if adopted {
            state.payments.push(payment.clone());
        } else {
            *state.payment_mut(payment.id)? = payment.clone();
        }

        let mut order = order;
        if let Some((from, to)) = order_change {
            order.status = to;
            order.updated_at = now;
            state.orders.insert(order.id, order.clone());
            state.history.push(OrderStatusHistory {
                id: Uuid::new_v4(),
                order_id: order.id,
                from_status: from,
                to_status: to,
                webhook_event_id: command.delivery_id,
                changed_at: now,
            });
        }

        let events = reconciliation_events(
            &order,
            &payment,
            &command.gateway_event_id,
            order_change,
            payment_change,
        );
        state.outbox.extend(events);

        state.delivery_mut(command.delivery_id)?.status = WebhookEventStatus::Applied;

        Ok(TransitionOutcome::Applied {
            order_id: order.id,
            payment_id: payment.id,
            order_change,
            payment_change,
            adopted,
        })
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn record(&self, entry: TransactionLogEntry) -> anyhow::Result<()> {
        self.state.write().await.audit.push(entry);
        Ok(())
    }
}

#[async_trait]
impl Outbox for InMemoryStore {
    async fn enqueue(&self, event: DomainEvent) -> anyhow::Result<()> {
        self.state.write().await.outbox.push(event);
        Ok(())
    }

    async fn due_events(&self, now: DateTime<Utc>, limit: i64) -> anyhow::Result<Vec<DomainEvent>> {
        let state = self.state.read().await;
        let mut due: Vec<DomainEvent> = state
            .outbox
            .iter()
            .filter(|event| event.dispatched_at.is_none() && event.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|event| event.next_attempt_at);
        due.truncate(usize::try_from(limit).unwrap_or_default());
        Ok(due)
    }

    async fn mark_dispatched(&self, event_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let event = state
            .outbox
            .iter_mut()
            .find(|event| event.id == event_id)
            .with_context(|| format!("outbox event {event_id} not found"))?;
        event.dispatched_at = Some(at);
        event.attempts += 1;
        event.last_error = None;
        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        let event = state
            .outbox
            .iter_mut()
            .find(|event| event.id == event_id)
            .with_context(|| format!("outbox event {event_id} not found"))?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        event.next_attempt_at = next_attempt_at;
        Ok(())
    }
}
