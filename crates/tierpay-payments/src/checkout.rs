use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tierpay_commission::{HouseWallets, ReferralResolver, compute_split};
use tierpay_core::{
    GatewayCharge, NewPayment, OrderStatus, OrderStore, PaymentStore, ReserveOutcome,
    SplitAllocation,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{ChargeMethod, ChargeResult, GatewayClient};
use crate::error::CheckoutError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    /// Overrides the code captured on the order, when present.
    pub referral_code: Option<String>,
    pub method: ChargeMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub payment_id: Uuid,
    pub allocation: SplitAllocation,
    pub charge: ChargeResult,
}

pub struct CheckoutService {
    orders: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentStore>,
    resolver: ReferralResolver,
    house: HouseWallets,
    client: GatewayClient,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentStore>,
        resolver: ReferralResolver,
        house: HouseWallets,
        client: GatewayClient,
    ) -> Self {
        Self {
            orders,
            payments,
            resolver,
            house,
            client,
        }
    }

    pub async fn submit_charge(
        &self,
        request: ChargeRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let order = self
            .orders
            .find_order(request.order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(request.order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(CheckoutError::OrderNotPayable {
                status: order.status,
            });
        }

        let code = request
            .referral_code
            .as_deref()
            .or(order.referral_code.as_deref())
            .unwrap_or_default();
        let network = self.resolver.resolve(code).await?;
        let allocation = compute_split(&network, &self.house)?;

        let reserved = self
            .payments
            .reserve_payment(NewPayment {
                order_id: order.id,
                method: request.method.payment_method(),
                amount_cents: order.total_cents,
                split: allocation.clone(),
            })
            .await?;
        let payment = match reserved {
            ReserveOutcome::Reserved(payment) => payment,
            ReserveOutcome::Conflict { existing } => {
                return Err(CheckoutError::ChargeInProgress {
                    payment_id: existing,
                });
            }
        };

        let charge = match self
            .client
            .create_charge_for_payment(&order, Some(payment.id), &request.method, &allocation)
            .await
        {
            Ok(charge) => charge,
            Err(err) => {
                warn!(
                    order_id = %order.id,
                    payment_id = %payment.id,
                    code = err.code(),
                    "charge submission failed: {err}"
                );
                self.payments
                    .mark_payment_failed(payment.id, err.code())
                    .await?;
                return Err(err.into());
            }
        };

        // A webhook may have recorded the charge already; the store merges.
        let held = self
            .payments
            .attach_gateway_charge(
                payment.id,
                GatewayCharge {
                    gateway_payment_id: charge.gateway_payment_id().to_string(),
                    status: charge.status(),
                    card_token: charge.card_token().map(str::to_string),
                },
            )
            .await?;

        info!(
            order_id = %order.id,
            payment_id = %held.id,
            tiers = network.len(),
            "charge submitted"
        );

        Ok(CheckoutReceipt {
            payment_id: held.id,
            allocation,
            charge,
        })
    }
}
