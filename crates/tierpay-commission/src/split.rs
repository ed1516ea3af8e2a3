use rust_decimal::Decimal;
use tierpay_core::{ConfigurationError, PayoutId, SplitAllocation, SplitEntry, SplitRole};

use crate::resolver::{NetworkShape, ReferralNetwork};

pub const HOUSE_PRIMARY_LABEL: &str = "RENUM";
pub const HOUSE_SECONDARY_LABEL: &str = "JB";

/// Share of the order routed through the split: referral tiers plus house wallets.
pub fn commission_quota() -> Decimal {
    Decimal::new(30, 0) // 30%
}

/// Percentages for one network shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub n1: Decimal,
    pub n2: Decimal,
    pub n3: Decimal,
    /// Paid to each of the two house wallets.
    pub house_each: Decimal,
}

/// Redistribution policy. Missing tiers fold into the house wallets; the
/// per-shape figures are business decisions and are listed, not derived.
pub fn tier_policy(shape: NetworkShape) -> TierPolicy {
    match shape {
        NetworkShape::Empty => TierPolicy {
            n1: Decimal::ZERO,
            n2: Decimal::ZERO,
            n3: Decimal::ZERO,
            house_each: Decimal::new(15, 0),
        },
        NetworkShape::N1 => TierPolicy {
            n1: Decimal::new(15, 0),
            n2: Decimal::ZERO,
            n3: Decimal::ZERO,
            house_each: Decimal::new(75, 1),
        },
        NetworkShape::N1N2 => TierPolicy {
            n1: Decimal::new(15, 0),
            n2: Decimal::new(3, 0),
            n3: Decimal::ZERO,
            house_each: Decimal::new(6, 0),
        },
        NetworkShape::Full => TierPolicy {
            n1: Decimal::new(15, 0),
            n2: Decimal::new(3, 0),
            n3: Decimal::new(2, 0),
            house_each: Decimal::new(5, 0),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseWallets {
    primary: PayoutId,
    secondary: PayoutId,
}

impl HouseWallets {
    /// Validates both configured wallets. Called before any gateway traffic so
    /// that a bad deployment fails checkout instead of misrouting money.
    pub fn from_config(
        primary: Option<&str>,
        secondary: Option<&str>,
    ) -> Result<Self, ConfigurationError> {
        let primary = house_wallet(HOUSE_PRIMARY_LABEL, primary)?;
        let secondary = house_wallet(HOUSE_SECONDARY_LABEL, secondary)?;

        if primary == secondary {
            return Err(ConfigurationError::HouseWallet {
                label: HOUSE_SECONDARY_LABEL,
                reason: "must differ from the primary house wallet".to_string(),
            });
        }

        Ok(Self { primary, secondary })
    }

    pub fn primary(&self) -> &PayoutId {
        &self.primary
    }

    pub fn secondary(&self) -> &PayoutId {
        &self.secondary
    }
}

fn house_wallet(label: &'static str, value: Option<&str>) -> Result<PayoutId, ConfigurationError> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigurationError::HouseWallet {
            label,
            reason: "not configured".to_string(),
        })?;

    PayoutId::parse(value).map_err(|err| ConfigurationError::HouseWallet {
        label,
        reason: err.to_string(),
    })
}

/// Allocation for a resolved network. Entries are ordered N1, N2, N3, then
/// the primary and secondary house wallets. The sum is checked against the
/// quota on construction; a mismatch is a configuration fault.
pub fn compute_split(
    network: &ReferralNetwork,
    house: &HouseWallets,
) -> Result<SplitAllocation, ConfigurationError> {
    let policy = tier_policy(network.shape());
    let mut entries = Vec::with_capacity(5);

    let tiers = [
        (network.n1(), SplitRole::N1, policy.n1),
        (network.n2(), SplitRole::N2, policy.n2),
        (network.n3(), SplitRole::N3, policy.n3),
    ];
    for (tier, role, percent) in tiers {
        if let Some(tier) = tier {
            entries.push(SplitEntry {
                payout_id: tier.payout_id.clone(),
                role,
                percent,
            });
        }
    }

    entries.push(SplitEntry {
        payout_id: house.primary.clone(),
        role: SplitRole::HousePrimary,
        percent: policy.house_each,
    });
    entries.push(SplitEntry {
        payout_id: house.secondary.clone(),
        role: SplitRole::HouseSecondary,
        percent: policy.house_each,
    });

    SplitAllocation::new(entries, commission_quota())
}
