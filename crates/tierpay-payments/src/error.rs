use serde_json::Value;
use thiserror::Error;
use tierpay_core::{ConfigurationError, OrderStatus};
use uuid::Uuid;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Retries exhausted. The charge may still exist on the gateway side.
    #[error("GATEWAY_UNAVAILABLE: no successful response after {attempts} attempts")]
    Unavailable { attempts: u32 },

    /// A non-transient client error; not retried.
    #[error("gateway rejected the request with HTTP {status}")]
    Rejected { status: u16, body: Value },

    #[error("unexpected gateway response: {0}")]
    Decode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "GATEWAY_UNAVAILABLE",
            Self::Rejected { .. } => "GATEWAY_REJECTED",
            Self::Decode(_) => "GATEWAY_BAD_RESPONSE",
            Self::Transport(_) => "GATEWAY_TRANSPORT",
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("order is {status} and cannot be charged")]
    OrderNotPayable { status: OrderStatus },

    #[error("charge {payment_id} for this order is still open")]
    ChargeInProgress { payment_id: Uuid },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("UNEXPECTED_ERROR: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}
