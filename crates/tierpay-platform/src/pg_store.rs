//! Postgres implementation of the storage seams.
//!
//! Multi-record operations run in one transaction. Reservation and
//! transition application serialize on the order row (`FOR UPDATE`); the
//! webhook claim relies on the partial unique index over
//! `webhook_events (gateway_event_id) WHERE status IN ('received', 'applied')`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tierpay_core::{
    Affiliate, AffiliateStatus, AffiliateStore, AuditLog, ClaimOutcome, DomainEvent,
    DomainEventKind, GatewayCharge, NewPayment, NewWebhookDelivery, Order, OrderStatus,
    OrderStatusHistory, OrderStore, Outbox, Payment, PaymentMethod, PaymentStatus, PaymentStore,
    ReconciliationStore, ReserveOutcome, SplitAllocation, TransactionLogEntry, TransitionCommand,
    TransitionOutcome, TransitionRejection, WebhookEvent, WebhookEventStatus, WebhookEventStore,
    absorb_gateway_charge, adopted_payment, payment_from_reservation, plan_reconciliation,
    reconciliation_events,
};
use tracing::debug;
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, customer_ref, total_cents, status, referral_code, created_at, updated_at, deleted_at";
const PAYMENT_COLUMNS: &str = "id, order_id, gateway_payment_id, status, method, amount_cents, split, card_token, failure_reason, created_at, updated_at";
const OUTBOX_COLUMNS: &str = "id, aggregate_id, kind, payload, attempts, next_attempt_at, dispatched_at, last_error, occurred_at";

/// A concurrent release can empty the claim between our insert and the
/// holder lookup; the claim is retried this many times before giving up.
const CLAIM_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AffiliateStore for PgStore {
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<Affiliate>> {
        let row = sqlx::query(
            "SELECT id, referral_code, payout_id, referred_by, status FROM affiliates WHERE referral_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(affiliate_from_row).transpose()
    }

    async fn find_affiliate(&self, id: Uuid) -> Result<Option<Affiliate>> {
        let row = sqlx::query(
            "SELECT id, referral_code, payout_id, referred_by, status FROM affiliates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(affiliate_from_row).transpose()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn status_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, from_status, to_status, webhook_event_id, changed_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY changed_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OrderStatusHistory> {
                Ok(OrderStatusHistory {
                    id: row.try_get("id")?,
                    order_id: row.try_get("order_id")?,
                    from_status: row.try_get::<String, _>("from_status")?.parse()?,
                    to_status: row.try_get::<String, _>("to_status")?.parse()?,
                    webhook_event_id: row.try_get("webhook_event_id")?,
                    changed_at: row.try_get("changed_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn reserve_payment(&self, payment: NewPayment) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        lock_order(&mut tx, payment.order_id)
            .await?
            .with_context(|| format!("order {} not found", payment.order_id))?;

        let open = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM payments WHERE order_id = $1 AND status IN ('pending', 'authorized') LIMIT 1",
        )
        .bind(payment.order_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = open {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Conflict { existing });
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
        insert_payment(&mut tx, &reserved).await?;
        tx.commit().await?;

        Ok(ReserveOutcome::Reserved(reserved))
    }

    async fn attach_gateway_charge(
        &self,
        payment_id: Uuid,
        charge: GatewayCharge,
    ) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        // Same lock order as apply_transition: order row first, then payments.
        let order_id = sqlx::query_scalar::<_, Uuid>("SELECT order_id FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .with_context(|| format!("payment {payment_id} not found"))?;
        sqlx::query("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;
        let reservation = payment_from_row(&row)?;

        let holder = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_payment_id = $1 FOR UPDATE"
        ))
        .bind(&charge.gateway_payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(payment_from_row)
        .transpose()?;

        let payment = match holder {
            Some(mut held) => {
                absorb_gateway_charge(&mut held, &charge);
                update_charge(&mut tx, &held).await?;
                if held.id != reservation.id && reservation.gateway_payment_id.is_none() {
                    debug!(
                        reservation = %reservation.id,
                        payment_id = %held.id,
                        "charge already adopted, dropping empty reservation"
                    );
                    sqlx::query("DELETE FROM payments WHERE id = $1")
                        .bind(reservation.id)
                        .execute(&mut *tx)
                        .await?;
                }
                held
            }
            None if reservation.gateway_payment_id.is_none() => {
                let mut payment = reservation;
                absorb_gateway_charge(&mut payment, &charge);
                update_charge(&mut tx, &payment).await?;
                payment
            }
            None => {
                let payment = payment_from_reservation(&reservation, &charge);
                insert_payment(&mut tx, &payment).await?;
                payment
            }
        };

        tx.commit().await?;
        Ok(payment)
    }

    async fn mark_payment_failed(&self, payment_id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE payments SET status = 'failed', failure_reason = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(payment_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_payment_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_payment_id = $1"
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}

#[async_trait]
impl WebhookEventStore for PgStore {
    async fn claim_event(&self, delivery: NewWebhookDelivery) -> Result<ClaimOutcome> {
        for _ in 0..CLAIM_ATTEMPTS {
            let claimed = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO webhook_events (id, gateway_event_id, signature, raw_payload, status, received_at)
                VALUES ($1, $2, $3, $4, 'received', $5)
                ON CONFLICT (gateway_event_id) WHERE status IN ('received', 'applied') DO NOTHING
                RETURNING id
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&delivery.gateway_event_id)
            .bind(&delivery.signature)
            .bind(&delivery.raw_payload)
            .bind(delivery.received_at)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(delivery_id) = claimed {
                return Ok(ClaimOutcome::Claimed { delivery_id });
            }

            let holder = sqlx::query_scalar::<_, String>(
                "SELECT status FROM webhook_events WHERE gateway_event_id = $1 AND status IN ('received', 'applied') LIMIT 1",
            )
            .bind(&delivery.gateway_event_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(holder) = holder else {
                debug!(
                    gateway_event_id = %delivery.gateway_event_id,
                    "claim released concurrently; retrying"
                );
                continue;
            };
            let holder = WebhookEventStatus::parse(&holder)
                .with_context(|| format!("unknown webhook status {holder}"))?;

            let delivery_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO webhook_events (id, gateway_event_id, signature, raw_payload, status, received_at)
                VALUES ($1, $2, $3, $4, 'duplicate', $5)
                "#,
            )
            .bind(delivery_id)
            .bind(&delivery.gateway_event_id)
            .bind(&delivery.signature)
            .bind(&delivery.raw_payload)
            .bind(delivery.received_at)
            .execute(&self.pool)
            .await?;

            return Ok(ClaimOutcome::Duplicate {
                delivery_id,
                holder,
            });
        }

        anyhow::bail!(
            "could not claim webhook event {} after {CLAIM_ATTEMPTS} attempts",
            delivery.gateway_event_id
        )
    }

    async fn reject_event(&self, delivery_id: Uuid, reason: &str) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET status = 'rejected', reason = $2 WHERE id = $1")
            .bind(delivery_id)
            .bind(reason)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn deliveries(&self, gateway_event_id: &str) -> Result<Vec<WebhookEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, gateway_event_id, signature, raw_payload, status, reason, received_at
            FROM webhook_events
            WHERE gateway_event_id = $1
            ORDER BY received_at
            "#,
        )
        .bind(gateway_event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<WebhookEvent> {
                let status: String = row.try_get("status")?;
                Ok(WebhookEvent {
                    id: row.try_get("id")?,
                    gateway_event_id: row.try_get("gateway_event_id")?,
                    signature: row.try_get("signature")?,
                    raw_payload: row.try_get("raw_payload")?,
                    status: WebhookEventStatus::parse(&status)
                        .with_context(|| format!("unknown webhook status {status}"))?,
                    reason: row.try_get("reason")?,
                    received_at: row.try_get("received_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn apply_transition(&self, command: TransitionCommand) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let known_order = sqlx::query_scalar::<_, Uuid>(
            "SELECT order_id FROM payments WHERE gateway_payment_id = $1",
        )
        .bind(&command.gateway_payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = known_order.or(command.order_ref) else {
            let rejection = TransitionRejection::UnknownPayment {
                gateway_payment_id: command.gateway_payment_id.clone(),
            };
            return reject_in(tx, &command, None, rejection).await;
        };

        let Some(order) = lock_order(&mut tx, order_id).await? else {
            let rejection = TransitionRejection::OrderNotFound { order_id };
            return reject_in(tx, &command, Some(order_id), rejection).await;
        };

        let existing = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_payment_id = $1 FOR UPDATE"
        ))
        .bind(&command.gateway_payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let existing = match existing {
            Some(row) => Some(row),
            None => {
                sqlx::query(&format!(
                    r#"
                    SELECT {PAYMENT_COLUMNS} FROM payments
                    WHERE order_id = $1 AND gateway_payment_id IS NULL AND status IN ('pending', 'authorized')
                    ORDER BY created_at DESC
                    LIMIT 1
                    FOR UPDATE
                    "#
                ))
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let (mut payment, adopted) = match existing {
            Some(row) => (payment_from_row(&row)?, false),
            None => {
                let prior_split = sqlx::query_scalar::<_, Value>(
                    "SELECT split FROM payments WHERE order_id = $1 AND split IS NOT NULL ORDER BY created_at DESC LIMIT 1",
                )
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?
                .map(serde_json::from_value::<SplitAllocation>)
                .transpose()?;
                (adopted_payment(&order, &command, prior_split), true)
            }
        };

        let (order_change, payment_change) = match plan_reconciliation(&order, &payment, &command)
        {
            Ok(plan) => plan,
            Err(rejection) => return reject_in(tx, &command, Some(order.id), rejection).await,
        };

        let now = Utc::now();
        let binds_reservation = payment.gateway_payment_id.is_none();
        payment.gateway_payment_id = Some(command.gateway_payment_id.clone());
        if let Some((_, to)) = payment_change {
            payment.status = to;
            payment.updated_at = now;
        }
        if adopted {
            insert_payment(&mut tx, &payment).await?;
        } else if payment_change.is_some() || binds_reservation {
            payment.updated_at = now;
            update_charge(&mut tx, &payment).await?;
        }

        let mut order = order;
        if let Some((from, to)) = order_change {
            order.status = to;
            order.updated_at = now;

            sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(order.id)
                .bind(to.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO order_status_history (id, order_id, from_status, to_status, webhook_event_id, changed_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(command.delivery_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let events = reconciliation_events(
            &order,
            &payment,
            &command.gateway_event_id,
            order_change,
            payment_change,
        );
        for event in &events {
            insert_outbox_event(&mut tx, event).await?;
        }

        sqlx::query("UPDATE webhook_events SET status = 'applied' WHERE id = $1")
            .bind(command.delivery_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

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
impl AuditLog for PgStore {
    async fn record(&self, entry: TransactionLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transaction_logs (
                id, type, request, response, success, http_status, order_ref, payment_ref, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.kind)
        .bind(&entry.request)
        .bind(&entry.response)
        .bind(entry.success)
        .bind(entry.http_status.map(i32::from))
        .bind(entry.order_ref)
        .bind(entry.payment_ref)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Outbox for PgStore {
    async fn enqueue(&self, event: DomainEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_outbox_event(&mut tx, &event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn due_events(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outbox_events
            WHERE dispatched_at IS NULL AND next_attempt_at <= $1
            ORDER BY occurred_at
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outbox_event_from_row).collect()
    }

    async fn mark_dispatched(&self, event_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET dispatched_at = $2, attempts = attempts + 1, last_error = NULL WHERE id = $1",
        )
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_attempt_failed(
        &self,
        event_id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET attempts = attempts + 1, last_error = $2, next_attempt_at = $3 WHERE id = $1",
        )
        .bind(event_id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<Option<Order>> {
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref().map(order_from_row).transpose()
}

/// Marks the delivery rejected and commits; nothing else in `tx` is kept.
async fn reject_in(
    mut tx: Transaction<'_, Postgres>,
    command: &TransitionCommand,
    order_id: Option<Uuid>,
    rejection: TransitionRejection,
) -> Result<TransitionOutcome> {
    sqlx::query("UPDATE webhook_events SET status = 'rejected', reason = $2 WHERE id = $1")
        .bind(command.delivery_id)
        .bind(rejection.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(TransitionOutcome::Rejected {
        order_id,
        rejection,
    })
}

async fn update_charge(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET gateway_payment_id = $2, status = $3, card_token = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(payment.id)
    .bind(&payment.gateway_payment_id)
    .bind(payment.status.as_str())
    .bind(&payment.card_token)
    .bind(payment.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_payment(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> Result<()> {
    let split = payment.split.as_ref().map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, gateway_payment_id, status, method, amount_cents, split,
            card_token, failure_reason, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(payment.id)
    .bind(payment.order_id)
    .bind(&payment.gateway_payment_id)
    .bind(payment.status.as_str())
    .bind(payment.method.as_str())
    .bind(payment.amount_cents)
    .bind(split)
    .bind(&payment.card_token)
    .bind(&payment.failure_reason)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_outbox_event(tx: &mut Transaction<'_, Postgres>, event: &DomainEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (
            id, aggregate_id, kind, payload, attempts, next_attempt_at, dispatched_at, last_error, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(event.id)
    .bind(event.aggregate_id)
    .bind(event.kind.as_str())
    .bind(&event.payload)
    .bind(event.attempts)
    .bind(event.next_attempt_at)
    .bind(event.dispatched_at)
    .bind(&event.last_error)
    .bind(event.occurred_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn affiliate_from_row(row: &PgRow) -> Result<Affiliate> {
    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "active" => AffiliateStatus::Active,
        "inactive" => AffiliateStatus::Inactive,
        other => anyhow::bail!("unknown affiliate status {other}"),
    };

    Ok(Affiliate {
        id: row.try_get("id")?,
        referral_code: row.try_get("referral_code")?,
        payout_id: row.try_get("payout_id")?,
        referred_by: row.try_get("referred_by")?,
        status,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        customer_ref: row.try_get("customer_ref")?,
        total_cents: row.try_get("total_cents")?,
        status: row.try_get::<String, _>("status")?.parse::<OrderStatus>()?,
        referral_code: row.try_get("referral_code")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let method: String = row.try_get("method")?;
    let split = row
        .try_get::<Option<Value>, _>("split")?
        .map(serde_json::from_value::<SplitAllocation>)
        .transpose()?;

    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        gateway_payment_id: row.try_get("gateway_payment_id")?,
        status: row.try_get::<String, _>("status")?.parse::<PaymentStatus>()?,
        method: PaymentMethod::parse(&method)
            .with_context(|| format!("unknown payment method {method}"))?,
        amount_cents: row.try_get("amount_cents")?,
        split,
        card_token: row.try_get("card_token")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn outbox_event_from_row(row: &PgRow) -> Result<DomainEvent> {
    let kind: String = row.try_get("kind")?;

    Ok(DomainEvent {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        kind: DomainEventKind::parse(&kind)
            .with_context(|| format!("unknown outbox event kind {kind}"))?,
        payload: row.try_get("payload")?,
        attempts: row.try_get("attempts")?,
        next_attempt_at: row.try_get("next_attempt_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
        last_error: row.try_get("last_error")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}
