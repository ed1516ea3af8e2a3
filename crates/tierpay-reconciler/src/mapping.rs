use tierpay_core::{OrderStatus, PaymentStatus};

/// Target statuses implied by one gateway payment status. `None` leaves
/// that side untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTransition {
    pub payment: Option<PaymentStatus>,
    pub order: Option<OrderStatus>,
}

impl GatewayTransition {
    const fn new(payment: Option<PaymentStatus>, order: Option<OrderStatus>) -> Self {
        Self { payment, order }
    }
}

/// Returns `None` for statuses this service does not act on.
pub fn map_gateway_status(status: &str) -> Option<GatewayTransition> {
    let transition = match status.trim().to_ascii_uppercase().as_str() {
        "PENDING" => GatewayTransition::new(Some(PaymentStatus::Pending), None),
        "AUTHORIZED" => GatewayTransition::new(Some(PaymentStatus::Authorized), None),
        "CONFIRMED" => {
            GatewayTransition::new(Some(PaymentStatus::Confirmed), Some(OrderStatus::Paid))
        }
        "RECEIVED" | "RECEIVED_IN_CASH" => {
            GatewayTransition::new(Some(PaymentStatus::Received), Some(OrderStatus::Paid))
        }
        "REFUSED" | "OVERDUE" => GatewayTransition::new(Some(PaymentStatus::Failed), None),
        "REFUNDED" | "CHARGEBACK_REQUESTED" => {
            GatewayTransition::new(None, Some(OrderStatus::Cancelled))
        }
        _ => return None,
    };
    Some(transition)
}
