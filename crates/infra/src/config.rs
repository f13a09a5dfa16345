//! Process configuration, read from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `BANK_LISTEN_ADDR` | `0.0.0.0:9090` |
//! | `DATABASE_URL` | unset (in-memory store) |
//! | `BANK_RATE_PAIR` | `USD/IDR` |
//! | `BANK_RATE_INTERVAL_SECS` | `5` |
//! | `BANK_RATE_BASE` | `2000` |
//! | `BANK_RATE_SPREAD` | `300` |
//! | `BANK_STREAM_DELAY_SECS` | `3` |
//! | `BANK_CONTINUE_ON_TRANSFER_FAILURE` | `false` |
//! | `BANK_SEED_ACCOUNTS` | unset (`NUMBER:BALANCE,...`) |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use bankstream_banking::CurrencyPair;

use crate::workers::RateProducer;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, value: &str, reason: impl core::fmt::Display) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Account opened at startup (in-memory demo seeding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAccount {
    pub account_number: String,
    pub opening_balance: Decimal,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: Option<String>,
    pub rate_producer: RateProducer,
    pub stream_delay: Duration,
    pub continue_on_transfer_failure: bool,
    pub seed_accounts: Vec<SeedAccount>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_or(&lookup, "BANK_LISTEN_ADDR", "0.0.0.0:9090", SocketAddr::from_str)?;

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if database_url.is_none() {
            warn!("DATABASE_URL not set; using in-memory ledger store");
        }

        let pair = parse_or(&lookup, "BANK_RATE_PAIR", "USD/IDR", CurrencyPair::from_str)?;
        let interval_secs = parse_or(&lookup, "BANK_RATE_INTERVAL_SECS", "5", u64::from_str)?;
        if interval_secs == 0 {
            return Err(ConfigError::invalid("BANK_RATE_INTERVAL_SECS", "0", "must be at least 1"));
        }
        let base = parse_or(&lookup, "BANK_RATE_BASE", "2000", f64::from_str)?;
        if !(base.is_finite() && base > 0.0) {
            return Err(ConfigError::invalid("BANK_RATE_BASE", &base.to_string(), "must be positive"));
        }
        let spread = parse_or(&lookup, "BANK_RATE_SPREAD", "300", u32::from_str)?;

        let mut rate_producer = RateProducer::new(pair);
        rate_producer.interval = Duration::from_secs(interval_secs);
        rate_producer.base = base;
        rate_producer.spread = spread;

        let stream_delay = Duration::from_secs(parse_or(&lookup, "BANK_STREAM_DELAY_SECS", "3", u64::from_str)?);
        let continue_on_transfer_failure =
            parse_or(&lookup, "BANK_CONTINUE_ON_TRANSFER_FAILURE", "false", bool::from_str)?;

        let seed_accounts = match lookup("BANK_SEED_ACCOUNTS") {
            Some(raw) => parse_seed_accounts(&raw)?,
            None => Vec::new(),
        };

        info!(
            %listen_addr,
            persistent = database_url.is_some(),
            rate_pair = %rate_producer.pair,
            rate_interval_secs = interval_secs,
            stream_delay_secs = stream_delay.as_secs(),
            continue_on_transfer_failure,
            seed_accounts = seed_accounts.len(),
            "configuration loaded"
        );

        Ok(Self {
            listen_addr,
            database_url,
            rate_producer,
            stream_delay,
            continue_on_transfer_failure,
            seed_accounts,
        })
    }
}

fn parse_or<F, T, E>(lookup: &F, var: &'static str, default: &str, parse: fn(&str) -> Result<T, E>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    E: core::fmt::Display,
{
    let raw = lookup(var).unwrap_or_else(|| default.to_string());
    parse(raw.trim()).map_err(|e| ConfigError::invalid(var, &raw, e))
}

fn parse_seed_accounts(raw: &str) -> Result<Vec<SeedAccount>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (number, balance) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::invalid("BANK_SEED_ACCOUNTS", entry, "expected NUMBER:BALANCE"))?;
            let opening_balance = Decimal::from_str(balance.trim())
                .map_err(|e| ConfigError::invalid("BANK_SEED_ACCOUNTS", entry, e))?;
            if opening_balance.is_sign_negative() {
                return Err(ConfigError::invalid("BANK_SEED_ACCOUNTS", entry, "negative balance"));
            }
            Ok(SeedAccount {
                account_number: number.trim().to_string(),
                opening_balance,
            })
        })
        .collect()
}
