//! Referral chain resolution.
//!
//! Starting from the affiliate that owns a referral code, follow `referred_by`
//! links for at most three hops. The first inactive, unknown or badly
//! configured link ends the chain; later tiers are never reached by skipping
//! over a broken one.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tierpay_core::{Affiliate, AffiliateStore, PayoutId};
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_TIERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateRef {
    pub affiliate_id: Uuid,
    pub payout_id: PayoutId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkShape {
    Empty,
    N1,
    N1N2,
    Full,
}

/// Tiers in order N1, N2, N3. A tier is only present when every tier
/// before it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralNetwork {
    tiers: Vec<AffiliateRef>,
}

impl ReferralNetwork {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a network from an ordered chain, dropping anything past N3.
    pub fn from_chain(mut tiers: Vec<AffiliateRef>) -> Self {
        tiers.truncate(MAX_TIERS);
        Self { tiers }
    }

    pub fn n1(&self) -> Option<&AffiliateRef> {
        self.tiers.first()
    }

    pub fn n2(&self) -> Option<&AffiliateRef> {
        self.tiers.get(1)
    }

    pub fn n3(&self) -> Option<&AffiliateRef> {
        self.tiers.get(2)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn shape(&self) -> NetworkShape {
        match self.tiers.len() {
            0 => NetworkShape::Empty,
            1 => NetworkShape::N1,
            2 => NetworkShape::N1N2,
            _ => NetworkShape::Full,
        }
    }
}

pub struct ReferralResolver {
    affiliates: Arc<dyn AffiliateStore>,
}

impl ReferralResolver {
    pub fn new(affiliates: Arc<dyn AffiliateStore>) -> Self {
        Self { affiliates }
    }

    /// A missing or unusable affiliate yields a shorter (possibly empty)
    /// network, not an error. Only store failures are errors.
    pub async fn resolve(&self, referral_code: &str) -> anyhow::Result<ReferralNetwork> {
        let code = referral_code.trim();
        if code.is_empty() {
            return Ok(ReferralNetwork::empty());
        }

        let mut tiers = Vec::with_capacity(MAX_TIERS);
        let mut visited = HashSet::new();
        let mut next = self.affiliates.find_by_referral_code(code).await?;

        while let Some(affiliate) = next.take() {
            if !visited.insert(affiliate.id) {
                warn!(
                    affiliate_id = %affiliate.id,
                    referral_code = code,
                    "referral chain revisits an affiliate; stopping"
                );
                break;
            }

            let Some(tier) = usable_tier(&affiliate) else {
                break;
            };
            tiers.push(tier);

            if tiers.len() == MAX_TIERS {
                break;
            }

            next = match affiliate.referred_by {
                Some(parent_id) => self.affiliates.find_affiliate(parent_id).await?,
                None => None,
            };
        }

        debug!(referral_code = code, tiers = tiers.len(), "referral network resolved");
        Ok(ReferralNetwork::from_chain(tiers))
    }
}

fn usable_tier(affiliate: &Affiliate) -> Option<AffiliateRef> {
    if !affiliate.is_active() {
        debug!(affiliate_id = %affiliate.id, "inactive affiliate ends referral chain");
        return None;
    }

    match PayoutId::parse(&affiliate.payout_id) {
        Ok(payout_id) => Some(AffiliateRef {
            affiliate_id: affiliate.id,
            payout_id,
        }),
        Err(err) => {
            warn!(affiliate_id = %affiliate.id, "affiliate ends referral chain: {err}");
            None
        }
    }
}
