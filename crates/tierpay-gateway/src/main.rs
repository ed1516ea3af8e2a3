use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use tierpay_commission::{HouseWallets, ReferralResolver};
use tierpay_payments::{
    AuditRecorder, ChargeRequest, CheckoutError, CheckoutReceipt, CheckoutService, GatewayClient,
    GatewayError, ReqwestTransport, RetryPolicy,
};
use tierpay_platform::{
    GatewaySettings, PgStore, ServiceConfig, WebhookAck, connect_database, run_migrations,
};
use tierpay_reconciler::{ReconciliationResult, SignatureVerifier, WebhookError, WebhookReconciler};
use tracing::{error, info, warn};
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Clone)]
struct AppState {
    checkout: Arc<CheckoutService>,
    reconciler: Arc<WebhookReconciler>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "tierpay_gateway=info,tierpay_payments=info,tierpay_reconciler=info".to_string()
            }),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let settings = GatewaySettings::from_env()?;

    // A bad house wallet must stop the process before any charge is attempted.
    let house = HouseWallets::from_config(
        settings.house_wallet_primary.as_deref(),
        settings.house_wallet_secondary.as_deref(),
    )
    .context("invalid house wallet configuration")?;

    let pool = connect_database(&config.database_url).await?;
    run_migrations(&pool).await?;
    let store = Arc::new(PgStore::new(pool));
    let audit = AuditRecorder::new(store.clone());

    let transport = ReqwestTransport::new(&settings.base_url, &settings.api_key, settings.timeout)?;
    let client = GatewayClient::new(
        Arc::new(transport),
        RetryPolicy {
            max_attempts: settings.max_attempts,
            base_delay: settings.retry_base,
        },
        audit.clone(),
    );
    let checkout = CheckoutService::new(
        store.clone(),
        store.clone(),
        ReferralResolver::new(store.clone()),
        house,
        client,
    );

    let verifier = SignatureVerifier::new(settings.webhook_secret.as_bytes())?;
    let reconciler =
        WebhookReconciler::new(verifier, store.clone(), store.clone(), store.clone(), audit);

    let state = AppState {
        checkout: Arc::new(checkout),
        reconciler: Arc::new(reconciler),
    };
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/checkout/charges", post(submit_charge))
        .route("/webhooks/payments", post(receive_webhook))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn submit_charge(
    State(state): State<AppState>,
    Json(payload): Json<ChargeRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>), (StatusCode, String)> {
    let order_id = payload.order_id;
    let receipt = state.checkout.submit_charge(payload).await.map_err(|err| {
        let (status, message) = checkout_error(&err);
        match &err {
            CheckoutError::Unexpected(_) => {}
            _ if status.is_server_error() => error!(%order_id, "checkout failed: {err}"),
            _ => warn!(%order_id, "checkout refused: {err}"),
        }
        (status, message)
    })?;

    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, (StatusCode, String)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let result = state
        .reconciler
        .handle_webhook(&body, signature)
        .await
        .map_err(webhook_error)?;

    Ok(Json(match result {
        ReconciliationResult::Applied { order_id, .. } => WebhookAck::applied(order_id),
        ReconciliationResult::Duplicate { delivery_id } => WebhookAck::duplicate(delivery_id),
        ReconciliationResult::Rejected { reason } => WebhookAck::rejected(reason),
    }))
}

fn checkout_error(err: &CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::OrderNotPayable { .. } | CheckoutError::ChargeInProgress { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        CheckoutError::Gateway(GatewayError::Rejected { .. }) => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        // Configuration faults and gateway outages look the same to the shopper.
        CheckoutError::Configuration(_) | CheckoutError::Gateway(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "payment unavailable".to_string(),
        ),
        CheckoutError::Unexpected(source) => {
            let correlation_id = Uuid::new_v4();
            error!(%correlation_id, "checkout failed unexpectedly: {source:#}");
            internal_error(format!("payment unavailable (ref {correlation_id})"))
        }
    }
}

fn webhook_error(err: WebhookError) -> (StatusCode, String) {
    match err {
        WebhookError::InvalidSignature(_) => {
            warn!("webhook refused: {err}");
            (StatusCode::UNAUTHORIZED, err.to_string())
        }
        WebhookError::Unexpected(source) => {
            let correlation_id = Uuid::new_v4();
            error!(%correlation_id, "webhook processing failed: {source:#}");
            internal_error(format!("webhook processing failed (ref {correlation_id})"))
        }
    }
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use tierpay_core::{ConfigurationError, OrderStatus};
    use tierpay_reconciler::SignatureError;

    use super::*;

    #[test]
    fn test_checkout_error_statuses() {
        let cases = [
            (CheckoutError::OrderNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (
                CheckoutError::OrderNotPayable {
                    status: OrderStatus::Paid,
                },
                StatusCode::CONFLICT,
            ),
            (
                CheckoutError::ChargeInProgress {
                    payment_id: Uuid::new_v4(),
                },
                StatusCode::CONFLICT,
            ),
            (
                CheckoutError::Gateway(GatewayError::Unavailable { attempts: 3 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CheckoutError::Gateway(GatewayError::Rejected {
                    status: 400,
                    body: serde_json::Value::Null,
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                CheckoutError::Unexpected(anyhow::anyhow!("pool timed out")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(checkout_error(&err).0, expected, "{err}");
        }
    }

    #[test]
    fn test_unexpected_checkout_failure_is_not_leaked() {
        let err = CheckoutError::Unexpected(anyhow::anyhow!(
            "error returned from database: relation \"payments\" does not exist"
        ));

        let (status, message) = checkout_error(&err);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.starts_with("payment unavailable (ref "));
        assert!(!message.contains("database"));
        assert!(!message.contains("payments\""));
    }

    #[test]
    fn test_configuration_fault_is_not_leaked() {
        let err = CheckoutError::Configuration(ConfigurationError::HouseWallet {
            label: "RENUM",
            reason: "missing".to_string(),
        });

        let (status, message) = checkout_error(&err);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message, "payment unavailable");
    }

    #[test]
    fn test_webhook_error_statuses() {
        assert_eq!(
            webhook_error(WebhookError::InvalidSignature(SignatureError::Mismatch)).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            webhook_error(WebhookError::Unexpected(anyhow::anyhow!("db down"))).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
