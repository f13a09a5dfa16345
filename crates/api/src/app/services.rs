use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use bankstream_core::LedgerError;
use bankstream_infra::store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
use bankstream_infra::{AppConfig, RateFeed, RateProducerHandle};

use crate::protocol::{BankProtocol, ProtocolConfig};

/// Protocol bound to the type-erased store chosen at startup.
pub type AppProtocol = BankProtocol<Arc<dyn LedgerStore>>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error("failed to open ledger store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to seed account: {0}")]
    Seed(#[from] LedgerError),
}

/// Everything a request handler needs, plus the background producer.
pub struct AppServices {
    pub protocol: AppProtocol,
    producer: Mutex<Option<RateProducerHandle>>,
}

impl AppServices {
    /// Stop the rate producer. Idempotent.
    pub async fn shutdown(&self) {
        let handle = match self.producer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

/// Wire the store, protocol and rate producer from configuration.
///
/// `DATABASE_URL` selects Postgres; otherwise an in-memory store is used.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => {
            info!("using Postgres ledger store");
            Arc::new(PostgresLedgerStore::connect(url).await?)
        }
        None => Arc::new(InMemoryLedgerStore::new()),
    };
    build_services_on(config, store).await
}

/// Same as [`build_services`] over an already opened store.
///
/// `BANK_SEED_ACCOUNTS` are opened first; an account that already exists is
/// left as it is. Any other failure aborts startup.
pub async fn build_services_on(
    config: &AppConfig,
    store: Arc<dyn LedgerStore>,
) -> Result<AppServices, ServicesError> {
    let protocol = BankProtocol::new(
        store.clone(),
        ProtocolConfig {
            stream_delay: config.stream_delay,
            continue_on_transfer_failure: config.continue_on_transfer_failure,
        },
    );

    for seed in &config.seed_accounts {
        match protocol
            .balances()
            .open_account(&seed.account_number, seed.opening_balance, "USD")
            .await
        {
            Ok(account) => info!(account_number = %account.account_number, balance = %account.balance, "seeded account"),
            Err(LedgerError::AccountExists { account_number }) => {
                warn!(%account_number, "seed account already present; skipped");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let producer = config.rate_producer.start(RateFeed::new(store)).await;

    Ok(AppServices {
        protocol,
        producer: Mutex::new(Some(producer)),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};

    use bankstream_banking::{Account, CurrencyPair, ExchangeRate, Transaction, Transfer};
    use bankstream_core::{AccountId, ExchangeRateId, TransferId};
    use bankstream_infra::store::{AccountStore, RateStore, TransactionStore, TransferStore};

    use super::*;

    /// In-memory store whose account registration fails like a dropped connection.
    #[derive(Default)]
    struct UnreachableStore {
        inner: InMemoryLedgerStore,
    }

    #[async_trait::async_trait]
    impl AccountStore for UnreachableStore {
        async fn open_account(&self, _account: Account) -> Result<Account, StoreError> {
            Err(StoreError::Backend("connection reset by peer".into()))
        }

        async fn account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
            self.inner.account_by_number(account_number).await
        }
    }

    #[async_trait::async_trait]
    impl TransactionStore for UnreachableStore {
        async fn post(&self, postings: Vec<Transaction>) -> Result<Vec<Account>, StoreError> {
            self.inner.post(postings).await
        }

        async fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError> {
            self.inner.transactions_for(account_id).await
        }
    }

    #[async_trait::async_trait]
    impl TransferStore for UnreachableStore {
        async fn create_transfer(&self, transfer: &Transfer) -> Result<TransferId, StoreError> {
            self.inner.create_transfer(transfer).await
        }

        async fn update_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
            self.inner.update_transfer(transfer).await
        }

        async fn transfer_by_id(&self, transfer_id: TransferId) -> Result<Transfer, StoreError> {
            self.inner.transfer_by_id(transfer_id).await
        }
    }

    #[async_trait::async_trait]
    impl RateStore for UnreachableStore {
        async fn create_rate(&self, rate: &ExchangeRate) -> Result<ExchangeRateId, StoreError> {
            self.inner.create_rate(rate).await
        }

        async fn rate_at(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> Result<ExchangeRate, StoreError> {
            self.inner.rate_at(pair, at).await
        }
    }

    fn config(seeds: &str) -> AppConfig {
        let vars = HashMap::from([("BANK_SEED_ACCOUNTS", seeds.to_string())]);
        AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    #[tokio::test]
    async fn store_failure_while_seeding_aborts_startup() {
        let store: Arc<dyn LedgerStore> = Arc::new(UnreachableStore::default());
        let result = build_services_on(&config("A:100"), store).await;

        assert!(matches!(result, Err(ServicesError::Seed(LedgerError::Storage { .. }))));
    }

    #[tokio::test]
    async fn already_present_seed_account_is_kept() {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
        let first = build_services_on(&config("A:100"), store.clone()).await.unwrap();
        first.shutdown().await;

        let second = build_services_on(&config("A:5"), store.clone()).await.unwrap();
        second.shutdown().await;

        assert_eq!(
            store.account_by_number("A").await.unwrap().balance,
            rust_decimal::Decimal::from(100)
        );
    }
}
