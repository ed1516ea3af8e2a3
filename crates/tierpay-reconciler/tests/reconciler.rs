use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tierpay_core::{
    DomainEventKind, GatewayCharge, NewPayment, Order, OrderStatus, OrderStore, PaymentMethod,
    PaymentStatus, PaymentStore, PayoutId, ReconciliationStore, ReserveOutcome, SplitAllocation,
    SplitEntry, SplitRole, TransitionCommand, TransitionOutcome, WebhookEventStatus,
    WebhookEventStore,
};
use tierpay_payments::AuditRecorder;
use tierpay_reconciler::{ReconciliationResult, SignatureVerifier, WebhookError, WebhookReconciler};
use tierpay_store::InMemoryStore;
use uuid::Uuid;

const SECRET: &[u8] = b"whsec_reconciler_tests";

fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(SECRET).unwrap()
}

fn reconciler(store: Arc<InMemoryStore>) -> WebhookReconciler {
    WebhookReconciler::new(
        verifier(),
        store.clone(),
        store.clone(),
        store.clone(),
        AuditRecorder::new(store),
    )
}

fn n1_split() -> SplitAllocation {
    let entry = |id: &str, role, percent| SplitEntry {
        payout_id: PayoutId::parse(id).unwrap(),
        role,
        percent,
    };
    SplitAllocation::new(
        vec![
            entry("wal_ana0000000000000001", SplitRole::N1, Decimal::new(15, 0)),
            entry("wal_renum0000000000001", SplitRole::HousePrimary, Decimal::new(75, 1)),
            entry("wal_jb00000000000000001", SplitRole::HouseSecondary, Decimal::new(75, 1)),
        ],
        Decimal::new(30, 0),
    )
    .unwrap()
}

async fn charged_order(store: &InMemoryStore, gateway_id: &str) -> Order {
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        customer_ref: "cus_000005113026".to_string(),
        total_cents: 10_000,
        status: OrderStatus::Pending,
        referral_code: Some("ANA10".to_string()),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    store.insert_order(order.clone()).await;

    let ReserveOutcome::Reserved(payment) = store
        .reserve_payment(NewPayment {
            order_id: order.id,
            method: PaymentMethod::Pix,
            amount_cents: order.total_cents,
            split: n1_split(),
        })
        .await
        .unwrap()
    else {
        panic!("reservation should succeed");
    };
    store
        .attach_gateway_charge(
            payment.id,
            GatewayCharge {
                gateway_payment_id: gateway_id.to_string(),
                status: PaymentStatus::Pending,
                card_token: None,
            },
        )
        .await
        .unwrap();

    order
}

fn notification(event_id: &str, payment_id: &str, status: &str, order_id: Option<Uuid>) -> Vec<u8> {
    let mut payment = json!({
        "id": payment_id,
        "status": status,
        "billingType": "PIX",
        "value": 100.0,
    });
    if let Some(order_id) = order_id {
        payment["externalReference"] = json!(order_id.to_string());
    }
    serde_json::to_vec(&json!({
        "id": event_id,
        "event": format!("PAYMENT_{status}"),
        "payment": payment,
    }))
    .unwrap()
}

async fn deliver(reconciler: &WebhookReconciler, raw: &[u8]) -> Result<ReconciliationResult, WebhookError> {
    let signature = verifier().sign(raw);
    reconciler.handle_webhook(raw, Some(&signature)).await
}

async fn order_status(store: &InMemoryStore, order_id: Uuid) -> OrderStatus {
    store.find_order(order_id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_confirmed_payment_marks_order_paid() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());

    let result = deliver(&reconciler, &notification("evt_1", "pay_1", "CONFIRMED", None))
        .await
        .unwrap();

    assert!(matches!(
        result,
        ReconciliationResult::Applied {
            order_change: Some((OrderStatus::Pending, OrderStatus::Paid)),
            payment_change: Some((PaymentStatus::Pending, PaymentStatus::Confirmed)),
            adopted: false,
            ..
        }
    ));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Paid);

    let history = store.status_history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to_status, OrderStatus::Paid);

    let kinds: Vec<DomainEventKind> = store
        .outbox_events()
        .await
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![DomainEventKind::CommissionPayable, DomainEventKind::CrmTimeline]
    );

    let payable = &store.outbox_events().await[0].payload;
    assert_eq!(payable["shares"][0]["amount_cents"], 1500);
    assert_eq!(payable["shares"][1]["amount_cents"], 750);

    let deliveries = store.deliveries("evt_1").await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, WebhookEventStatus::Applied);
}

#[tokio::test]
async fn test_redelivery_is_a_duplicate() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());
    let raw = notification("evt_1", "pay_1", "CONFIRMED", None);

    deliver(&reconciler, &raw).await.unwrap();
    let second = deliver(&reconciler, &raw).await.unwrap();

    assert!(matches!(second, ReconciliationResult::Duplicate { .. }));
    assert_eq!(store.status_history(order.id).await.unwrap().len(), 1);
    assert_eq!(store.outbox_events().await.len(), 2);

    let statuses: Vec<WebhookEventStatus> = store
        .deliveries("evt_1")
        .await
        .unwrap()
        .iter()
        .map(|delivery| delivery.status)
        .collect();
    assert_eq!(
        statuses,
        vec![WebhookEventStatus::Applied, WebhookEventStatus::Duplicate]
    );

    let audit: Vec<String> = store
        .audit_entries()
        .await
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(audit, vec!["webhook_processed", "webhook_duplicate"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_apply_once() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = Arc::new(reconciler(store.clone()));
    let raw = notification("evt_race", "pay_1", "RECEIVED", None);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let reconciler = reconciler.clone();
        let raw = raw.clone();
        handles.push(tokio::spawn(async move {
            deliver(&reconciler, &raw).await.unwrap()
        }));
    }

    let mut applied = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ReconciliationResult::Applied { .. } => applied += 1,
            ReconciliationResult::Duplicate { .. } => duplicates += 1,
            other => panic!("unexpected result {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(store.status_history(order.id).await.unwrap().len(), 1);
    let payable = store
        .outbox_events()
        .await
        .iter()
        .filter(|event| event.kind == DomainEventKind::CommissionPayable)
        .count();
    assert_eq!(payable, 1);
}

#[tokio::test]
async fn test_bad_signature_changes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());
    let raw = notification("evt_1", "pay_1", "CONFIRMED", None);

    let forged = SignatureVerifier::new(b"attacker").unwrap().sign(&raw);
    let err = reconciler
        .handle_webhook(&raw, Some(&forged))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature(_)));

    let err = reconciler.handle_webhook(&raw, None).await.unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature(_)));

    assert_eq!(order_status(&store, order.id).await, OrderStatus::Pending);
    assert!(store.all_deliveries().await.is_empty());
    assert!(store.outbox_events().await.is_empty());

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 2);
    assert!(audit.iter().all(|entry| entry.kind == "webhook_rejected" && !entry.success));

    // the genuine delivery still goes through afterwards
    let result = deliver(&reconciler, &raw).await.unwrap();
    assert!(matches!(result, ReconciliationResult::Applied { .. }));
}

#[tokio::test]
async fn test_delivered_order_rejects_late_payment_and_alerts() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    store.set_order_status(order.id, OrderStatus::Delivered).await;
    let reconciler = reconciler(store.clone());
    let raw = notification("evt_late", "pay_1", "RECEIVED", None);

    let result = deliver(&reconciler, &raw).await.unwrap();

    let ReconciliationResult::Rejected { reason } = result else {
        panic!("expected rejection, got {result:?}");
    };
    assert!(reason.contains("delivered"));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Delivered);

    let events = store.outbox_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, DomainEventKind::ManualReviewRequired);
    assert_eq!(events[0].payload["gateway_event_id"], "evt_late");

    let deliveries = store.deliveries("evt_late").await.unwrap();
    assert_eq!(deliveries[0].status, WebhookEventStatus::Rejected);
    assert!(deliveries[0].reason.is_some());

    // a rejected delivery releases the event id, so redelivery is re-evaluated
    let again = deliver(&reconciler, &raw).await.unwrap();
    assert!(matches!(again, ReconciliationResult::Rejected { .. }));
}

#[tokio::test]
async fn test_received_after_confirmed_only_advances_payment() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());

    deliver(&reconciler, &notification("evt_1", "pay_1", "CONFIRMED", None))
        .await
        .unwrap();
    let result = deliver(&reconciler, &notification("evt_2", "pay_1", "RECEIVED", None))
        .await
        .unwrap();

    assert!(matches!(
        result,
        ReconciliationResult::Applied {
            order_change: None,
            payment_change: Some((PaymentStatus::Confirmed, PaymentStatus::Received)),
            ..
        }
    ));
    assert_eq!(store.status_history(order.id).await.unwrap().len(), 1);
    let payable = store
        .outbox_events()
        .await
        .iter()
        .filter(|event| event.kind == DomainEventKind::CommissionPayable)
        .count();
    assert_eq!(payable, 1);
    let payments = store.payments_for_order(order.id).await.unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Received);
}

#[tokio::test]
async fn test_payment_regression_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());

    deliver(&reconciler, &notification("evt_1", "pay_1", "RECEIVED", None))
        .await
        .unwrap();
    let result = deliver(&reconciler, &notification("evt_2", "pay_1", "PENDING", None))
        .await
        .unwrap();

    assert!(matches!(result, ReconciliationResult::Rejected { .. }));
    let alerts = store
        .outbox_events()
        .await
        .iter()
        .filter(|event| event.kind == DomainEventKind::ManualReviewRequired)
        .count();
    assert_eq!(alerts, 1);
}

#[tokio::test]
async fn test_refund_cancels_paid_order() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());

    deliver(&reconciler, &notification("evt_1", "pay_1", "CONFIRMED", None))
        .await
        .unwrap();
    let result = deliver(&reconciler, &notification("evt_2", "pay_1", "REFUNDED", None))
        .await
        .unwrap();

    assert!(matches!(
        result,
        ReconciliationResult::Applied {
            order_change: Some((OrderStatus::Paid, OrderStatus::Cancelled)),
            payment_change: None,
            ..
        }
    ));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_unknown_charge_is_adopted_through_reference() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_local").await;
    let reconciler = reconciler(store.clone());

    let raw = notification("evt_1", "pay_timed_out", "CONFIRMED", Some(order.id));
    let result = deliver(&reconciler, &raw).await.unwrap();

    assert!(matches!(
        result,
        ReconciliationResult::Applied { adopted: true, .. }
    ));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Paid);

    let adopted = store
        .find_payment_by_gateway_id("pay_timed_out")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(adopted.order_id, order.id);
    assert_eq!(adopted.status, PaymentStatus::Confirmed);
    assert_eq!(adopted.amount_cents, 10_000);
    assert_eq!(adopted.split, Some(n1_split()));
}

#[tokio::test]
async fn test_adopted_charge_without_split_asks_for_review() {
    let store = Arc::new(InMemoryStore::new());
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        customer_ref: "cus_000005113026".to_string(),
        total_cents: 10_000,
        status: OrderStatus::Pending,
        referral_code: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    store.insert_order(order.clone()).await;
    let reconciler = reconciler(store.clone());

    let raw = notification("evt_1", "pay_offline", "RECEIVED", Some(order.id));
    let result = deliver(&reconciler, &raw).await.unwrap();

    assert!(matches!(
        result,
        ReconciliationResult::Applied { adopted: true, .. }
    ));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Paid);

    let kinds: Vec<DomainEventKind> = store
        .outbox_events()
        .await
        .iter()
        .map(|event| event.kind)
        .collect();
    assert!(kinds.contains(&DomainEventKind::ManualReviewRequired));
    assert!(!kinds.contains(&DomainEventKind::CommissionPayable));
}

#[tokio::test]
async fn test_unknown_charge_without_reference_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = reconciler(store.clone());

    let result = deliver(&reconciler, &notification("evt_1", "pay_ghost", "CONFIRMED", None))
        .await
        .unwrap();

    assert!(matches!(result, ReconciliationResult::Rejected { .. }));
    assert!(store.outbox_events().await.is_empty());
}

#[tokio::test]
async fn test_unsupported_status_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let reconciler = reconciler(store.clone());

    let result = deliver(
        &reconciler,
        &notification("evt_1", "pay_1", "DUNNING_RECEIVED", None),
    )
    .await
    .unwrap();

    let ReconciliationResult::Rejected { reason } = result else {
        panic!("expected rejection");
    };
    assert!(reason.contains("DUNNING_RECEIVED"));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Pending);
    let deliveries = store.deliveries("evt_1").await.unwrap();
    assert_eq!(deliveries[0].status, WebhookEventStatus::Rejected);
}

#[tokio::test]
async fn test_signed_garbage_is_rejected_without_claim() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = reconciler(store.clone());

    let result = deliver(&reconciler, b"{\"unexpected\":true}").await.unwrap();

    assert!(matches!(result, ReconciliationResult::Rejected { .. }));
    assert!(store.all_deliveries().await.is_empty());
    assert_eq!(store.audit_entries().await[0].kind, "webhook_rejected");
}

/// Fails `apply_transition` until switched off.
struct FlakyStore {
    inner: Arc<InMemoryStore>,
    failing: AtomicBool,
}

#[async_trait]
impl ReconciliationStore for FlakyStore {
    async fn apply_transition(
        &self,
        command: TransitionCommand,
    ) -> anyhow::Result<TransitionOutcome> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset by peer");
        }
        self.inner.apply_transition(command).await
    }
}

#[tokio::test]
async fn test_unexpected_failure_releases_claim() {
    let store = Arc::new(InMemoryStore::new());
    let order = charged_order(&store, "pay_1").await;
    let flaky = Arc::new(FlakyStore {
        inner: store.clone(),
        failing: AtomicBool::new(true),
    });
    let reconciler = WebhookReconciler::new(
        verifier(),
        store.clone(),
        flaky.clone(),
        store.clone(),
        AuditRecorder::new(store.clone()),
    );
    let raw = notification("evt_1", "pay_1", "CONFIRMED", None);

    let err = deliver(&reconciler, &raw).await.unwrap_err();
    assert!(matches!(err, WebhookError::Unexpected(_)));
    let deliveries = store.deliveries("evt_1").await.unwrap();
    assert_eq!(deliveries[0].status, WebhookEventStatus::Rejected);
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Pending);

    flaky.failing.store(false, Ordering::SeqCst);
    let result = deliver(&reconciler, &raw).await.unwrap();
    assert!(matches!(result, ReconciliationResult::Applied { .. }));
    assert_eq!(order_status(&store, order.id).await, OrderStatus::Paid);
}
