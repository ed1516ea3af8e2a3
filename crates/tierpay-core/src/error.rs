use rust_decimal::Decimal;
use thiserror::Error;

/// Faults in split configuration. These halt checkout; a wrong split
/// must never reach the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("payout identifier {value:?} is not a valid wallet reference")]
    InvalidPayoutId { value: String },

    #[error("house wallet {label} is misconfigured: {reason}")]
    HouseWallet { label: &'static str, reason: String },

    #[error("split allocation sums to {actual}% but the commission quota is {expected}%")]
    SplitInvariant { expected: Decimal, actual: Decimal },

    #[error("split entry for {payout_id} has negative percentage {percent}")]
    NegativeShare { payout_id: String, percent: Decimal },
}
