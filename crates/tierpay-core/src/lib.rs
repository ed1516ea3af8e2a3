pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod payout;
pub mod storage;

pub use error::ConfigurationError;
pub use events::{
    CommissionPayableEvent, CrmTimelineEvent, DomainEvent, DomainEventKind, ManualReviewEvent,
    reconciliation_events,
};
pub use lifecycle::{OrderStatus, PaymentStatus, plan_order_transition, plan_payment_transition};
pub use models::{
    Affiliate, AffiliateStatus, CommissionShare, Order, OrderStatusHistory, Payment,
    PaymentMethod, SplitAllocation, SplitEntry, SplitRole, TransactionLogEntry, WebhookEvent,
    WebhookEventStatus,
};
pub use payout::{PayoutId, is_valid_payout_id};
pub use storage::{
    AffiliateStore, AuditLog, ClaimOutcome, GatewayCharge, NewPayment, NewWebhookDelivery,
    OrderStore, Outbox, PaymentStore, ReconciliationStore, ReserveOutcome, TransitionCommand,
    TransitionOutcome, TransitionRejection, WebhookEventStore, absorb_gateway_charge, adopted_payment,
    awaiting_charge, payment_from_reservation, plan_reconciliation,
};
