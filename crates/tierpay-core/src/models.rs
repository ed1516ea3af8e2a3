use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigurationError;
use crate::lifecycle::{OrderStatus, PaymentStatus};
use crate::payout::PayoutId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliateStatus {
    Active,
    Inactive,
}

/// An affiliate as seen by this core. Onboarding owns the record; we only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affiliate {
    pub id: Uuid,
    pub referral_code: String,
    /// Raw wallet reference as stored; may fail validation.
    pub payout_id: String,
    pub referred_by: Option<Uuid>,
    pub status: AffiliateStatus,
}

impl Affiliate {
    pub fn is_active(&self) -> bool {
        self.status == AffiliateStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_ref: String,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::CreditCard => "credit_card",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pix" => Some(Self::Pix),
            "credit_card" => Some(Self::CreditCard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// `None` for charges adopted from a webhook without a local submission.
    pub split: Option<SplitAllocation>,
    pub card_token: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRole {
    N1,
    N2,
    N3,
    HousePrimary,
    HouseSecondary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub payout_id: PayoutId,
    pub role: SplitRole,
    pub percent: Decimal,
}

/// Ordered commission split. Construction checks that the entries add up to
/// the quota exactly and that no share is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitAllocation {
    entries: Vec<SplitEntry>,
}

impl SplitAllocation {
    pub fn new(entries: Vec<SplitEntry>, quota: Decimal) -> Result<Self, ConfigurationError> {
        if let Some(negative) = entries.iter().find(|entry| entry.percent.is_sign_negative()) {
            return Err(ConfigurationError::NegativeShare {
                payout_id: negative.payout_id.to_string(),
                percent: negative.percent,
            });
        }

        let actual: Decimal = entries.iter().map(|entry| entry.percent).sum();
        if actual != quota {
            return Err(ConfigurationError::SplitInvariant {
                expected: quota,
                actual,
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SplitEntry] {
        &self.entries
    }

    pub fn total_percent(&self) -> Decimal {
        self.entries.iter().map(|entry| entry.percent).sum()
    }

    /// Cent amounts owed to each beneficiary for an order total. Each share is
    /// floored; the leftover cents stay with the merchant of record.
    pub fn commission_amounts(&self, total_cents: i64) -> Vec<CommissionShare> {
        let total = Decimal::from(total_cents);
        self.entries
            .iter()
            .map(|entry| CommissionShare {
                payout_id: entry.payout_id.clone(),
                role: entry.role,
                percent: entry.percent,
                amount_cents: (total * entry.percent / Decimal::ONE_HUNDRED)
                    .floor()
                    .to_i64()
                    .unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionShare {
    pub payout_id: PayoutId,
    pub role: SplitRole,
    pub percent: Decimal,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    Received,
    Applied,
    Duplicate,
    Rejected,
}

impl WebhookEventStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(Self::Received),
            "applied" => Some(Self::Applied),
            "duplicate" => Some(Self::Duplicate),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Statuses that hold the gateway event id against other deliveries.
    pub const fn holds_claim(&self) -> bool {
        matches!(self, Self::Received | Self::Applied)
    }
}

/// One delivery of a gateway notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub gateway_event_id: String,
    pub signature: String,
    pub raw_payload: String,
    pub status: WebhookEventStatus,
    pub reason: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub webhook_event_id: Uuid,
    pub changed_at: DateTime<Utc>,
}

/// Append-only audit row. Request and response bodies are stored already redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub success: bool,
    pub http_status: Option<u16>,
    pub order_ref: Option<Uuid>,
    pub payment_ref: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TransactionLogEntry {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            request: serde_json::Value::Null,
            response: serde_json::Value::Null,
            success: false,
            http_status: None,
            order_ref: None,
            payment_ref: None,
            created_at: Utc::now(),
        }
    }
}
