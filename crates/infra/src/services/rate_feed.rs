use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use bankstream_banking::{CurrencyPair, ExchangeRate, ValidityWindow};
use bankstream_core::{ExchangeRateId, LedgerError, LedgerResult};

use super::store_failure;
use crate::store::{RateStore, StoreError};

/// Exchange-rate lookup and recording.
#[derive(Debug, Clone)]
pub struct RateFeed<S> {
    store: S,
}

impl<S> RateFeed<S>
where
    S: RateStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Rate for `from`/`to` whose validity window covers `at`.
    pub async fn lookup_rate(&self, from: &str, to: &str, at: DateTime<Utc>) -> LedgerResult<f64> {
        let pair = CurrencyPair::new(from, to)?;
        Ok(self.lookup(&pair, at).await?.rate)
    }

    /// Full rate record covering `at`. The newest record wins when windows overlap.
    pub async fn lookup(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> LedgerResult<ExchangeRate> {
        self.store.rate_at(pair, at).await.map_err(|e| match e {
            StoreError::NotFound(_) => LedgerError::RateNotFound {
                from: pair.from.clone(),
                to: pair.to.clone(),
                at: at.to_rfc3339(),
            },
            other => store_failure(format!("rate_at({pair})"), other),
        })
    }

    /// Record a rate. Overlapping windows are accepted.
    pub async fn record_rate(
        &self,
        from: &str,
        to: &str,
        rate: f64,
        valid_from: DateTime<Utc>,
        valid_to: DateTime<Utc>,
    ) -> LedgerResult<ExchangeRateId> {
        let pair = CurrencyPair::new(from, to)?;
        let window = ValidityWindow::new(valid_from, valid_to)?;
        self.record(pair, rate, window).await
    }

    #[instrument(skip(self, pair, window), fields(pair = %pair), err)]
    pub async fn record(&self, pair: CurrencyPair, rate: f64, window: ValidityWindow) -> LedgerResult<ExchangeRateId> {
        let rate = ExchangeRate::new(pair, rate, window, Utc::now())?;
        let id = self
            .store
            .create_rate(&rate)
            .await
            .map_err(|e| store_failure(format!("create_rate({})", rate.pair), e))?;
        debug!(rate = rate.rate, valid_from = %window.valid_from, valid_to = %window.valid_to, "rate recorded");
        Ok(id)
    }
}
