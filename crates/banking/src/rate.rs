//! Exchange rates and their validity windows.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use bankstream_core::{Entity, ExchangeRateId, LedgerError, LedgerResult};

/// Validated (from, to) currency pair. Codes are three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> LedgerResult<Self> {
        let from = from.into();
        let to = to.into();
        validate_currency(&from)?;
        validate_currency(&to)?;
        Ok(Self { from, to })
    }
}

impl core::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

impl core::str::FromStr for CurrencyPair {
    type Err = LedgerError;

    /// Parses `USD/IDR`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s.split_once('/').ok_or_else(|| LedgerError::InvalidCurrency {
            currency: s.to_string(),
        })?;
        Self::new(from.trim(), to.trim())
    }
}

pub fn validate_currency(code: &str) -> LedgerResult<()> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(LedgerError::InvalidCurrency {
            currency: code.to_string(),
        })
    }
}

/// Time range during which a rate applies. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl ValidityWindow {
    pub fn new(valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> LedgerResult<Self> {
        if valid_to < valid_from {
            return Err(LedgerError::InvalidWindow {
                valid_from: valid_from.to_rfc3339(),
                valid_to: valid_to.to_rfc3339(),
            });
        }
        Ok(Self {
            valid_from,
            valid_to,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_to
    }

    /// The interval-aligned window containing `now`: `[floor, floor + interval - 1ms]`.
    pub fn current(now: DateTime<Utc>, interval: Duration) -> Self {
        let start = floor_to(now, interval);
        Self::spanning(start, interval)
    }

    /// The window starting at the first interval boundary strictly after `now`.
    pub fn next_aligned(now: DateTime<Utc>, interval: Duration) -> Self {
        let start = floor_to(now, interval) + interval;
        Self::spanning(start, interval)
    }

    /// The window of the same length that starts right after this one ends.
    pub fn following(&self, interval: Duration) -> Self {
        Self::spanning(self.valid_from + interval, interval)
    }

    fn spanning(start: DateTime<Utc>, interval: Duration) -> Self {
        let end = start + interval - Duration::milliseconds(1);
        Self {
            valid_from: start,
            valid_to: end.max(start),
        }
    }
}

fn floor_to(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.num_milliseconds().max(1);
    let ms = now.timestamp_millis();
    let floored = ms - ms.rem_euclid(step);
    Utc.timestamp_millis_opt(floored).single().unwrap_or(now)
}

/// A recorded rate for one currency pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: ExchangeRateId,
    pub pair: CurrencyPair,
    pub rate: f64,
    pub window: ValidityWindow,
    pub created_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(
        pair: CurrencyPair,
        rate: f64,
        window: ValidityWindow,
        now: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(LedgerError::invalid_amount(rate, "rate must be a positive number"));
        }
        Ok(Self {
            id: ExchangeRateId::new(),
            pair,
            rate,
            window,
            created_at: now,
        })
    }

    pub fn applies_to(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> bool {
        &self.pair == pair && self.window.contains(at)
    }
}

impl Entity for ExchangeRate {
    type Id = ExchangeRateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
