use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
        })
    }

    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
        })
    }
}

/// Payment gateway access and split destinations.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub webhook_secret: String,
    /// Validated later by `HouseWallets::from_config`, which names the bad one.
    pub house_wallet_primary: Option<String>,
    pub house_wallet_secondary: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_base: Duration,
}

impl GatewaySettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{key} is required"))
        };

        let max_attempts: u32 = parse_or(&lookup, "GATEWAY_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            anyhow::bail!("GATEWAY_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            base_url: required("GATEWAY_BASE_URL")?,
            api_key: required("GATEWAY_API_KEY")?,
            webhook_secret: required("GATEWAY_WEBHOOK_SECRET")?,
            house_wallet_primary: lookup("HOUSE_WALLET_RENUM"),
            house_wallet_secondary: lookup("HOUSE_WALLET_JB"),
            timeout: Duration::from_secs(parse_or(&lookup, "GATEWAY_TIMEOUT_SECS", 10)?),
            max_attempts,
            retry_base: Duration::from_millis(parse_or(&lookup, "GATEWAY_RETRY_BASE_MS", 200)?),
        })
    }
}

#[derive(Clone, Debug)]
pub struct OutboxSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl OutboxSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            poll_interval: Duration::from_millis(parse_or(&lookup, "OUTBOX_POLL_MS", 1000)?),
            batch_size: parse_or(&lookup, "OUTBOX_BATCH_SIZE", 50)?,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("GATEWAY_BASE_URL", "https://sandbox.gateway.test/api/v3"),
        ("GATEWAY_API_KEY", "key_test"),
        ("GATEWAY_WEBHOOK_SECRET", "whsec_test"),
    ];

    #[test]
    fn test_gateway_defaults() {
        let settings = GatewaySettings::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.retry_base, Duration::from_millis(200));
        assert_eq!(settings.house_wallet_primary, None);
    }

    #[test]
    fn test_missing_secret_named_in_error() {
        let err = GatewaySettings::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();

        assert!(err.to_string().contains("GATEWAY_WEBHOOK_SECRET"));
    }

    #[test]
    fn test_bad_number_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_TIMEOUT_SECS", "ten"));

        let err = GatewaySettings::from_lookup(lookup(&pairs)).unwrap_err();

        assert!(err.to_string().contains("GATEWAY_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("GATEWAY_MAX_ATTEMPTS", "0"));

        assert!(GatewaySettings::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn test_outbox_overrides() {
        let settings = OutboxSettings::from_lookup(lookup(&[
            ("OUTBOX_POLL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "10"),
        ]))
        .unwrap();

        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.batch_size, 10);
    }
}
