//! Idempotent reconciliation of signed gateway payment notifications.

pub mod mapping;
pub mod payload;
pub mod reconciler;
pub mod signature;

pub use mapping::{GatewayTransition, map_gateway_status};
pub use payload::{PayloadError, WebhookPayload, WebhookPayment};
pub use reconciler::{ReconciliationResult, WebhookError, WebhookReconciler};
pub use signature::{SignatureError, SignatureVerifier};
