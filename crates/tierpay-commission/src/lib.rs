pub mod resolver;
pub mod split;

pub use resolver::{AffiliateRef, MAX_TIERS, NetworkShape, ReferralNetwork, ReferralResolver};
pub use split::{HouseWallets, TierPolicy, commission_quota, compute_split, tier_policy};
