mod common;

use std::sync::Arc;

use serde_json::json;
use tierpay_commission::{HouseWallets, ReferralNetwork, compute_split};
use tierpay_core::{PaymentStatus, SplitAllocation};
use tierpay_payments::{
    CardDetails, CardHolder, ChargeMethod, ChargeResult, GatewayError, HttpMethod,
    TransportError,
};
use tierpay_store::InMemoryStore;

use common::{
    JB_WALLET, RENUM_WALLET, ScriptedTransport, client, created_charge, pending_order, pix_qr_code,
};

fn house_split() -> SplitAllocation {
    let house = HouseWallets::from_config(Some(RENUM_WALLET), Some(JB_WALLET)).unwrap();
    compute_split(&ReferralNetwork::empty(), &house).unwrap()
}

fn card() -> ChargeMethod {
    ChargeMethod::CreditCard {
        card: CardDetails {
            holder_name: "Ana Souza".to_string(),
            number: "4111111111111111".to_string(),
            expiry_month: "12".to_string(),
            expiry_year: "2030".to_string(),
            ccv: "123".to_string(),
        },
        holder: CardHolder {
            name: "Ana Souza".to_string(),
            email: "ana@example.com".to_string(),
            document: "12345678901".to_string(),
            postal_code: "01310-100".to_string(),
            address_number: "42".to_string(),
            phone: None,
        },
    }
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(503, json!({ "error": "maintenance" }))
            .reply(503, json!({ "error": "maintenance" }))
            .reply(200, json!({ "id": "pay_123", "status": "CONFIRMED" })),
    );
    let client = client(transport.clone(), store.clone());

    let result = client
        .create_charge(&pending_order(10_000), &card(), &house_split())
        .await
        .unwrap();

    assert_eq!(transport.requests().len(), 3);
    assert_eq!(result.gateway_payment_id(), "pay_123");
    assert_eq!(result.status(), PaymentStatus::Confirmed);
    assert_eq!(store.audit_entries().await.len(), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new().reply(404, json!({ "errors": [{ "code": "not_found" }] })),
    );
    let client = client(transport.clone(), store);

    let err = client
        .create_charge(&pending_order(10_000), &card(), &house_split())
        .await
        .unwrap_err();

    assert_eq!(transport.requests().len(), 1);
    assert!(matches!(err, GatewayError::Rejected { status: 404, .. }));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(429, json!({}))
            .reply(200, json!({ "id": "pay_9", "status": "PENDING" })),
    );
    let client = client(transport.clone(), store);

    let result = client
        .create_charge(&pending_order(5_000), &card(), &house_split())
        .await
        .unwrap();

    assert_eq!(transport.requests().len(), 2);
    assert_eq!(result.status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn test_exhausted_retries_report_unavailable() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(500, json!({}))
            .fail(TransportError::Timeout("deadline".to_string()))
            .reply(502, json!({})),
    );
    let client = client(transport.clone(), store.clone());

    let err = client
        .create_charge(&pending_order(5_000), &card(), &house_split())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Unavailable { attempts: 3 }));
    assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");
    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 3);
    assert!(audit.iter().all(|entry| !entry.success));
}

#[tokio::test]
async fn test_non_retryable_transport_error_stops() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new().fail(TransportError::Other("bad tls config".to_string())),
    );
    let client = client(transport.clone(), store);

    let err = client
        .create_charge(&pending_order(5_000), &card(), &house_split())
        .await
        .unwrap_err();

    assert_eq!(transport.requests().len(), 1);
    assert!(matches!(err, GatewayError::Transport(_)));
}

#[tokio::test]
async fn test_pix_charge_fetches_qr_code() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(200, created_charge("pay_pix_1", "PENDING"))
            .reply(200, pix_qr_code()),
    );
    let client = client(transport.clone(), store);

    let result = client
        .create_charge(&pending_order(10_000), &ChargeMethod::Pix, &house_split())
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, HttpMethod::Post);
    assert_eq!(requests[1].method, HttpMethod::Get);
    assert_eq!(requests[1].path, "/payments/pay_pix_1/pixQrCode");

    let ChargeResult::Pix {
        qr_payload,
        expires_at,
        ..
    } = result
    else {
        panic!("expected a pix result");
    };
    assert_eq!(qr_payload, "00020101021226820014br.gov.bcb.pix");
    assert_eq!(expires_at.format("%Y-%m-%d").to_string(), "2026-10-18");
}

#[tokio::test]
async fn test_charge_body_carries_split_and_reference() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(
        ScriptedTransport::new()
            .reply(200, created_charge("pay_1", "PENDING"))
            .reply(200, pix_qr_code()),
    );
    let client = client(transport.clone(), store);
    let order = pending_order(12_345);

    client
        .create_charge(&order, &ChargeMethod::Pix, &house_split())
        .await
        .unwrap();

    let body = transport.requests()[0].body.clone().unwrap();
    assert_eq!(body["billingType"], "PIX");
    assert_eq!(body["externalReference"], order.id.to_string());
    assert_eq!(body["value"], json!(123.45));
    assert_eq!(body["split"][0]["walletId"], RENUM_WALLET);
    assert_eq!(body["split"][0]["percentualValue"], json!(15.0));
    assert_eq!(body["split"][1]["walletId"], JB_WALLET);
}

#[tokio::test]
async fn test_audit_rows_are_redacted() {
    let store = Arc::new(InMemoryStore::new());
    let transport = Arc::new(ScriptedTransport::new().reply(
        200,
        json!({
            "id": "pay_cc",
            "status": "CONFIRMED",
            "creditCard": { "creditCardToken": "tok_abcdef123456" }
        }),
    ));
    let client = client(transport.clone(), store.clone());

    let result = client
        .create_charge(&pending_order(10_000), &card(), &house_split())
        .await
        .unwrap();
    assert_eq!(result.card_token(), Some("tok_abcdef123456"));

    let audit = store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    let entry = &audit[0];
    assert_eq!(entry.kind, "charge_request");
    assert_eq!(entry.http_status, Some(200));
    assert_eq!(entry.request["body"]["creditCard"]["number"], "****");
    assert_eq!(entry.request["body"]["creditCard"]["ccv"], "****");
    assert_eq!(
        entry.request["body"]["creditCardHolderInfo"]["cpfCnpj"],
        "*******8901"
    );
    assert_eq!(
        entry.response["creditCard"]["creditCardToken"],
        "************3456"
    );

    // the raw request still carried the real card number
    let sent = transport.requests()[0].body.clone().unwrap();
    assert_eq!(sent["creditCard"]["number"], "4111111111111111");
}
