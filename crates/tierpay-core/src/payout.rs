use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

static WALLET_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^wal_[A-Za-z0-9]{16,40}$").expect("wallet token pattern"));

// Legacy wallets were issued as hyphenated UUIDs.
static WALLET_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("wallet uuid pattern")
});

pub fn is_valid_payout_id(value: &str) -> bool {
    WALLET_TOKEN.is_match(value) || WALLET_UUID.is_match(value)
}

/// A gateway wallet reference that has passed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayoutId(String);

impl PayoutId {
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        let trimmed = value.trim();
        if is_valid_payout_id(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ConfigurationError::InvalidPayoutId {
                value: trimmed.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PayoutId {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PayoutId> for String {
    fn from(value: PayoutId) -> Self {
        value.0
    }
}

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
