#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tierpay_core::{Affiliate, AffiliateStatus, Order, OrderStatus};
use tierpay_payments::{
    AuditRecorder, GatewayClient, GatewayRequest, GatewayResponse, GatewayTransport, RetryPolicy,
    TransportError,
};
use tierpay_store::InMemoryStore;
use uuid::Uuid;

pub const RENUM_WALLET: &str = "wal_renum0000000000001";
pub const JB_WALLET: &str = "wal_jb00000000000000001";

/// Replays canned gateway replies in order and remembers every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<GatewayResponse, TransportError>>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(GatewayResponse { status, body }));
        self
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayTransport for ScriptedTransport {
    async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

pub fn client(transport: Arc<ScriptedTransport>, store: Arc<InMemoryStore>) -> GatewayClient {
    GatewayClient::new(transport, fast_retry(), AuditRecorder::new(store))
}

pub fn pending_order(total_cents: i64) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        customer_ref: "cus_000005113026".to_string(),
        total_cents,
        status: OrderStatus::Pending,
        referral_code: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

pub fn affiliate(code: &str, payout_id: &str, referred_by: Option<Uuid>) -> Affiliate {
    Affiliate {
        id: Uuid::new_v4(),
        referral_code: code.to_string(),
        payout_id: payout_id.to_string(),
        referred_by,
        status: AffiliateStatus::Active,
    }
}

pub fn created_charge(id: &str, status: &str) -> Value {
    json!({ "id": id, "status": status, "billingType": "PIX" })
}

pub fn pix_qr_code() -> Value {
    json!({
        "encodedImage": "iVBORw0KGgo=",
        "payload": "00020101021226820014br.gov.bcb.pix",
        "expirationDate": "2026-10-18 23:59:59"
    })
}
