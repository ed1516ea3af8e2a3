use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tierpay_core::{
    ClaimOutcome, DomainEvent, DomainEventKind, ManualReviewEvent, NewWebhookDelivery,
    OrderStatus, Outbox, PaymentStatus, ReconciliationStore, TransitionCommand,
    TransitionOutcome, TransitionRejection, WebhookEventStore,
};
use tierpay_payments::AuditRecorder;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::mapping::map_gateway_status;
use crate::payload::WebhookPayload;
use crate::signature::{SignatureError, SignatureVerifier};

/// Outcome of one delivery. Every variant is a success from the gateway's
/// point of view: it must not redeliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationResult {
    Applied {
        order_id: Uuid,
        payment_id: Uuid,
        order_change: Option<(OrderStatus, OrderStatus)>,
        payment_change: Option<(PaymentStatus, PaymentStatus)>,
        adopted: bool,
    },
    Duplicate {
        delivery_id: Uuid,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// The claim was released; a redelivery will be processed again.
    #[error("UNEXPECTED_ERROR: {0:#}")]
    Unexpected(anyhow::Error),
}

pub struct WebhookReconciler {
    verifier: SignatureVerifier,
    events: Arc<dyn WebhookEventStore>,
    store: Arc<dyn ReconciliationStore>,
    outbox: Arc<dyn Outbox>,
    audit: AuditRecorder,
}

impl WebhookReconciler {
    pub fn new(
        verifier: SignatureVerifier,
        events: Arc<dyn WebhookEventStore>,
        store: Arc<dyn ReconciliationStore>,
        outbox: Arc<dyn Outbox>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            verifier,
            events,
            store,
            outbox,
            audit,
        }
    }

    pub async fn handle_webhook(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconciliationResult, WebhookError> {
        if let Err(err) = self.verifier.verify(raw, signature) {
            warn!("webhook signature rejected: {err}");
            self.audit_delivery(
                "webhook_rejected",
                raw,
                json!({ "error": err.to_string() }),
                false,
                None,
            )
            .await;
            return Err(err.into());
        }

        let payload = match WebhookPayload::parse(raw) {
            Ok(payload) => payload,
            Err(err) => {
                let reason = format!("unreadable payload: {err}");
                warn!("{reason}");
                let response = json!({ "error": reason });
                self.audit_delivery("webhook_rejected", raw, response, false, None)
                    .await;
                return Ok(ReconciliationResult::Rejected { reason });
            }
        };

        let claim = self
            .events
            .claim_event(NewWebhookDelivery {
                gateway_event_id: payload.id.clone(),
                signature: signature.unwrap_or_default().trim().to_string(),
                raw_payload: String::from_utf8_lossy(raw).into_owned(),
                received_at: Utc::now(),
            })
            .await
            .map_err(WebhookError::Unexpected)?;

        let delivery_id = match claim {
            ClaimOutcome::Claimed { delivery_id } => delivery_id,
            ClaimOutcome::Duplicate {
                delivery_id,
                holder,
            } => {
                info!(
                    gateway_event_id = %payload.id,
                    holder = holder.as_str(),
                    "duplicate webhook delivery"
                );
                let result = ReconciliationResult::Duplicate { delivery_id };
                self.audit_delivery(
                    "webhook_duplicate",
                    raw,
                    describe(&result),
                    true,
                    payload.order_ref(),
                )
                .await;
                return Ok(result);
            }
        };

        match self.reconcile(delivery_id, &payload).await {
            Ok(result) => {
                let outcome = describe(&result);
                let (success, order_ref) = match &result {
                    ReconciliationResult::Applied { order_id, .. } => (true, Some(*order_id)),
                    _ => (false, payload.order_ref()),
                };
                self.audit_delivery("webhook_processed", raw, outcome, success, order_ref)
                    .await;
                Ok(result)
            }
            Err(err) => {
                error!(
                    gateway_event_id = %payload.id,
                    delivery_id = %delivery_id,
                    "webhook processing failed: {err:#}"
                );
                if let Err(release_err) = self
                    .events
                    .reject_event(delivery_id, &format!("{err:#}"))
                    .await
                {
                    error!(
                        delivery_id = %delivery_id,
                        "could not release webhook claim: {release_err:#}"
                    );
                }
                Err(WebhookError::Unexpected(err))
            }
        }
    }

    async fn reconcile(
        &self,
        delivery_id: Uuid,
        payload: &WebhookPayload,
    ) -> anyhow::Result<ReconciliationResult> {
        let Some(transition) = map_gateway_status(&payload.payment.status) else {
            let reason = format!("unsupported gateway status {:?}", payload.payment.status);
            warn!(gateway_event_id = %payload.id, "{reason}");
            self.events
                .reject_event(delivery_id, &reason)
                .await
                .context("marking unsupported delivery rejected")?;
            return Ok(ReconciliationResult::Rejected { reason });
        };

        let command = TransitionCommand {
            delivery_id,
            gateway_event_id: payload.id.clone(),
            gateway_payment_id: payload.payment.id.clone(),
            order_ref: payload.order_ref(),
            method: payload.method(),
            amount_cents: payload.amount_cents(),
            payment_status: transition.payment,
            order_status: transition.order,
        };

        let outcome = self
            .store
            .apply_transition(command)
            .await
            .context("applying webhook transition")?;

        match outcome {
            TransitionOutcome::Applied {
                order_id,
                payment_id,
                order_change,
                payment_change,
                adopted,
            } => {
                info!(
                    gateway_event_id = %payload.id,
                    order_id = %order_id,
                    payment_id = %payment_id,
                    adopted,
                    order_changed = order_change.is_some(),
                    payment_changed = payment_change.is_some(),
                    "webhook applied"
                );
                Ok(ReconciliationResult::Applied {
                    order_id,
                    payment_id,
                    order_change,
                    payment_change,
                    adopted,
                })
            }
            TransitionOutcome::Rejected {
                order_id,
                rejection,
            } => {
                let reason = rejection.to_string();
                warn!(
                    gateway_event_id = %payload.id,
                    order_id = ?order_id,
                    "webhook transition rejected: {reason}"
                );

                if needs_manual_review(&rejection) {
                    let alert = ManualReviewEvent {
                        order_id,
                        gateway_event_id: payload.id.clone(),
                        reason: reason.clone(),
                    };
                    self.outbox
                        .enqueue(DomainEvent::new(
                            DomainEventKind::ManualReviewRequired,
                            order_id,
                            serde_json::to_value(alert)?,
                        ))
                        .await
                        .context("enqueueing manual review alert")?;
                }

                Ok(ReconciliationResult::Rejected { reason })
            }
        }
    }

    async fn audit_delivery(
        &self,
        kind: &str,
        raw: &[u8],
        response: Value,
        success: bool,
        order_ref: Option<Uuid>,
    ) {
        let request = serde_json::from_slice(raw)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()));
        self.audit
            .record_exchange(kind, &request, &response, success, None, order_ref, None)
            .await;
    }
}

/// Out-of-order and regressing notifications mean the gateway and our
/// records disagree; someone has to look.
fn needs_manual_review(rejection: &TransitionRejection) -> bool {
    matches!(
        rejection,
        TransitionRejection::InvalidOrderTransition { .. }
            | TransitionRejection::InvalidPaymentTransition { .. }
    )
}

fn describe(result: &ReconciliationResult) -> Value {
    match result {
        ReconciliationResult::Applied {
            order_id,
            payment_id,
            adopted,
            ..
        } => json!({
            "result": "applied",
            "order_id": order_id,
            "payment_id": payment_id,
            "adopted": adopted,
        }),
        ReconciliationResult::Duplicate { delivery_id } => {
            json!({ "result": "duplicate", "delivery_id": delivery_id })
        }
        ReconciliationResult::Rejected { reason } => {
            json!({ "result": "rejected", "reason": reason })
        }
    }
}
