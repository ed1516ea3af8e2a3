use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tierpay_core::{Order, PaymentMethod, PaymentStatus, SplitAllocation};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::error::GatewayError;
use crate::transport::{GatewayRequest, GatewayResponse, GatewayTransport};

const PIX_DUE_DAYS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Wait after the zero-based `attempt` failed: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub ccv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardHolder {
    pub name: String,
    pub email: String,
    pub document: String,
    pub postal_code: String,
    pub address_number: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChargeMethod {
    Pix,
    CreditCard {
        card: CardDetails,
        holder: CardHolder,
    },
    /// Reuses a token returned by an earlier card charge.
    CardToken { token: String },
}

impl ChargeMethod {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            Self::Pix => PaymentMethod::Pix,
            Self::CreditCard { .. } | Self::CardToken { .. } => PaymentMethod::CreditCard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ChargeResult {
    Pix {
        gateway_payment_id: String,
        status: PaymentStatus,
        qr_payload: String,
        qr_image: String,
        expires_at: DateTime<Utc>,
    },
    CreditCard {
        gateway_payment_id: String,
        status: PaymentStatus,
        card_token: Option<String>,
    },
}

impl ChargeResult {
    pub fn gateway_payment_id(&self) -> &str {
        match self {
            Self::Pix {
                gateway_payment_id, ..
            }
            | Self::CreditCard {
                gateway_payment_id, ..
            } => gateway_payment_id,
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self {
            Self::Pix { status, .. } | Self::CreditCard { status, .. } => *status,
        }
    }

    pub fn card_token(&self) -> Option<&str> {
        match self {
            Self::Pix { .. } => None,
            Self::CreditCard { card_token, .. } => card_token.as_deref(),
        }
    }
}

/// Gateway payment status names as they appear in charge responses and webhooks.
pub fn payment_status_from_gateway(status: &str) -> Option<PaymentStatus> {
    match status.trim().to_ascii_uppercase().as_str() {
        "PENDING" | "AWAITING_RISK_ANALYSIS" => Some(PaymentStatus::Pending),
        "AUTHORIZED" => Some(PaymentStatus::Authorized),
        "CONFIRMED" => Some(PaymentStatus::Confirmed),
        "RECEIVED" | "RECEIVED_IN_CASH" => Some(PaymentStatus::Received),
        "REFUSED" | "OVERDUE" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

pub struct GatewayClient {
    transport: Arc<dyn GatewayTransport>,
    retry: RetryPolicy,
    audit: AuditRecorder,
}

impl GatewayClient {
    pub fn new(transport: Arc<dyn GatewayTransport>, retry: RetryPolicy, audit: AuditRecorder) -> Self {
        Self {
            transport,
            retry,
            audit,
        }
    }

    pub async fn create_charge(
        &self,
        order: &Order,
        method: &ChargeMethod,
        split: &SplitAllocation,
    ) -> Result<ChargeResult, GatewayError> {
        self.create_charge_for_payment(order, None, method, split)
            .await
    }

    /// Same as [`create_charge`](Self::create_charge), tagging audit rows with
    /// the local payment record.
    pub async fn create_charge_for_payment(
        &self,
        order: &Order,
        payment_ref: Option<Uuid>,
        method: &ChargeMethod,
        split: &SplitAllocation,
    ) -> Result<ChargeResult, GatewayError> {
        let body = charge_body(order, method, split);
        let response = self
            .send_with_retry(
                "charge_request",
                GatewayRequest::post("/payments", body),
                Some(order.id),
                payment_ref,
            )
            .await?;

        let gateway_payment_id = response.body["id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::Decode("charge response has no id".to_string()))?
            .to_string();
        let status_raw = response.body["status"].as_str().unwrap_or_default();
        let status = payment_status_from_gateway(status_raw).ok_or_else(|| {
            GatewayError::Decode(format!("unknown charge status {status_raw:?}"))
        })?;

        info!(
            order_id = %order.id,
            gateway_payment_id = %gateway_payment_id,
            status = %status,
            "gateway charge created"
        );

        match method {
            ChargeMethod::Pix => {
                self.pix_charge(order, payment_ref, gateway_payment_id, status)
                    .await
            }
            ChargeMethod::CreditCard { .. } | ChargeMethod::CardToken { .. } => {
                let card_token = response.body["creditCard"]["creditCardToken"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| match method {
                        ChargeMethod::CardToken { token } => Some(token.clone()),
                        _ => None,
                    });
                Ok(ChargeResult::CreditCard {
                    gateway_payment_id,
                    status,
                    card_token,
                })
            }
        }
    }

    async fn pix_charge(
        &self,
        order: &Order,
        payment_ref: Option<Uuid>,
        gateway_payment_id: String,
        status: PaymentStatus,
    ) -> Result<ChargeResult, GatewayError> {
        let response = self
            .send_with_retry(
                "pix_qr_code_request",
                GatewayRequest::get(format!("/payments/{gateway_payment_id}/pixQrCode")),
                Some(order.id),
                payment_ref,
            )
            .await?;

        let qr_payload = response.body["payload"]
            .as_str()
            .ok_or_else(|| GatewayError::Decode("pix response has no payload".to_string()))?
            .to_string();
        let qr_image = response.body["encodedImage"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let expires_raw = response.body["expirationDate"].as_str().unwrap_or_default();
        let expires_at = NaiveDateTime::parse_from_str(expires_raw, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|err| {
                GatewayError::Decode(format!("bad pix expiration {expires_raw:?}: {err}"))
            })?;

        Ok(ChargeResult::Pix {
            gateway_payment_id,
            status,
            qr_payload,
            qr_image,
            expires_at,
        })
    }

    /// Sends `request`, retrying 5xx, 429 and transport failures with
    /// exponential backoff. Every attempt is audited.
    async fn send_with_retry(
        &self,
        kind: &str,
        request: GatewayRequest,
        order_ref: Option<Uuid>,
        payment_ref: Option<Uuid>,
    ) -> Result<GatewayResponse, GatewayError> {
        let request_body = request.body.clone().unwrap_or(Value::Null);
        let audited_request = json!({ "path": request.path, "body": request_body });

        for attempt in 0..self.retry.max_attempts {
            match self.transport.send(&request).await {
                Ok(response) => {
                    self.audit
                        .record_exchange(
                            kind,
                            &audited_request,
                            &response.body,
                            response.is_success(),
                            Some(response.status),
                            order_ref,
                            payment_ref,
                        )
                        .await;

                    if response.is_success() {
                        return Ok(response);
                    }
                    if !response.is_retryable() {
                        warn!(kind, status = response.status, "gateway rejected request");
                        return Err(GatewayError::Rejected {
                            status: response.status,
                            body: crate::redact::redact(&response.body),
                        });
                    }
                    warn!(
                        kind,
                        status = response.status,
                        attempt = attempt + 1,
                        "gateway returned retryable status"
                    );
                }
                Err(err) => {
                    self.audit
                        .record_exchange(
                            kind,
                            &audited_request,
                            &json!({ "error": err.to_string() }),
                            false,
                            None,
                            order_ref,
                            payment_ref,
                        )
                        .await;

                    if !err.is_retryable() {
                        return Err(err.into());
                    }
                    warn!(kind, attempt = attempt + 1, "gateway transport failure: {err}");
                }
            }

            if attempt + 1 < self.retry.max_attempts {
                tokio::time::sleep(self.retry.delay_for(attempt)).await;
            }
        }

        Err(GatewayError::Unavailable {
            attempts: self.retry.max_attempts,
        })
    }
}

fn charge_body(order: &Order, method: &ChargeMethod, split: &SplitAllocation) -> Value {
    let split: Vec<Value> = split
        .entries()
        .iter()
        .map(|entry| {
            json!({
                "walletId": entry.payout_id.as_str(),
                "percentualValue": entry.percent.to_f64(),
            })
        })
        .collect();

    let due_date = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(PIX_DUE_DAYS))
        .unwrap_or_else(|| Utc::now().date_naive());

    let mut body = json!({
        "customer": order.customer_ref,
        "value": Decimal::new(order.total_cents, 2).to_f64(),
        "dueDate": due_date.format("%Y-%m-%d").to_string(),
        "externalReference": order.id.to_string(),
        "description": format!("Order {}", order.id),
        "split": split,
    });

    match method {
        ChargeMethod::Pix => {
            body["billingType"] = json!("PIX");
        }
        ChargeMethod::CreditCard { card, holder } => {
            body["billingType"] = json!("CREDIT_CARD");
            body["creditCard"] = json!({
                "holderName": card.holder_name,
                "number": card.number,
                "expiryMonth": card.expiry_month,
                "expiryYear": card.expiry_year,
                "ccv": card.ccv,
            });
            body["creditCardHolderInfo"] = json!({
                "name": holder.name,
                "email": holder.email,
                "cpfCnpj": holder.document,
                "postalCode": holder.postal_code,
                "addressNumber": holder.address_number,
                "phone": holder.phone,
            });
        }
        ChargeMethod::CardToken { token } => {
            body["billingType"] = json!("CREDIT_CARD");
            body["creditCardToken"] = json!(token);
        }
    }

    body
}
