use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tierpay_core::PaymentMethod;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload field `{0}` is empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub status: String,
    #[serde(rename = "externalReference", default)]
    pub external_reference: Option<String>,
    #[serde(rename = "billingType", default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub value: Option<Decimal>,
}

/// Notification body as posted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: String,
    #[serde(default)]
    pub event: String,
    pub payment: WebhookPayment,
}

impl WebhookPayload {
    pub fn parse(raw: &[u8]) -> Result<Self, PayloadError> {
        let payload: Self = serde_json::from_slice(raw)?;
        if payload.id.trim().is_empty() {
            return Err(PayloadError::EmptyField("id"));
        }
        if payload.payment.id.trim().is_empty() {
            return Err(PayloadError::EmptyField("payment.id"));
        }
        Ok(payload)
    }

    /// The order id we sent as the charge's external reference, if it parses.
    pub fn order_ref(&self) -> Option<Uuid> {
        self.payment
            .external_reference
            .as_deref()
            .and_then(|reference| Uuid::parse_str(reference.trim()).ok())
    }

    pub fn method(&self) -> Option<PaymentMethod> {
        match self.payment.billing_type.as_deref()? {
            "PIX" => Some(PaymentMethod::Pix),
            "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            _ => None,
        }
    }

    pub fn amount_cents(&self) -> Option<i64> {
        self.payment
            .value
            .and_then(|value| (value * Decimal::ONE_HUNDRED).round().to_i64())
    }
}
