//! Order and payment status lifecycles.
//!
//! Both enums carry their own transition table; the reconciler and the
//! stores validate against these tables using the persisted status at the
//! moment of application.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status values for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// `delivered` and `cancelled` admit no further transition.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, next),
            (Pending, Paid)
                | (Paid, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Paid, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Status values for a single charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Confirmed,
    Received,
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Confirmed => "confirmed",
            Self::Received => "received",
            Self::Failed => "failed",
        }
    }

    /// Pending and authorized charges still occupy the order's charge slot.
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Authorized)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;

        matches!(
            (self, next),
            (Pending, Authorized | Confirmed | Received | Failed)
                | (Authorized, Confirmed | Received | Failed)
                | (Confirmed, Received)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "authorized" => Ok(Self::Authorized),
            "confirmed" => Ok(Self::Confirmed),
            "received" => Ok(Self::Received),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// Checks a requested move against the current status.
///
/// Returns `Ok(None)` when the status is already the target (nothing to do),
/// `Ok(Some(target))` for an allowed move.
pub fn plan_order_transition(
    current: OrderStatus,
    target: OrderStatus,
) -> Result<Option<OrderStatus>, (OrderStatus, OrderStatus)> {
    if current == target {
        return Ok(None);
    }
    if current.can_transition_to(target) {
        Ok(Some(target))
    } else {
        Err((current, target))
    }
}

pub fn plan_payment_transition(
    current: PaymentStatus,
    target: PaymentStatus,
) -> Result<Option<PaymentStatus>, (PaymentStatus, PaymentStatus)> {
    if current == target {
        return Ok(None);
    }
    if current.can_transition_to(target) {
        Ok(Some(target))
    } else {
        Err((current, target))
    }
}
