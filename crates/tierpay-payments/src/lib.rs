//! Charge submission toward the payment gateway.

pub mod audit;
pub mod checkout;
pub mod client;
pub mod error;
pub mod redact;
pub mod transport;

pub use audit::AuditRecorder;
pub use checkout::{ChargeRequest, CheckoutReceipt, CheckoutService};
pub use client::{
    CardDetails, CardHolder, ChargeMethod, ChargeResult, GatewayClient, RetryPolicy,
    payment_status_from_gateway,
};
pub use error::{CheckoutError, GatewayError};
pub use transport::{
    GatewayRequest, GatewayResponse, GatewayTransport, HttpMethod, ReqwestTransport,
    TransportError,
};
