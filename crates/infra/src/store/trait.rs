use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use bankstream_banking::{Account, CurrencyPair, ExchangeRate, Transaction, Transfer};
use bankstream_core::{AccountId, ExchangeRateId, TransferId};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to ledger errors. Services
/// wrap them with the calling account/request context before returning.
///
/// `InsufficientFunds` is the one business failure a store reports: it comes
/// from the funds re-check performed inside the store's atomic unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds on {account_number}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_number: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Keyed storage of accounts by account number.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Register a new account. `Conflict` if the account number is taken.
    async fn open_account(&self, account: Account) -> Result<Account, StoreError>;

    /// Current snapshot of one account. `NotFound` if absent.
    async fn account_by_number(&self, account_number: &str) -> Result<Account, StoreError>;
}

/// Append-only journal of signed transactions.
///
/// ## Posting Semantics
///
/// `post()` is the only way balances change. For one call, implementations must:
/// - re-check every OUT posting against the balance *inside* the unit
///   (`InsufficientFunds` otherwise)
/// - append every transaction and apply every balance delta, or none of them
/// - serialize the check and the write against every other `post()` touching
///   the same accounts
/// - acquire account locks in ascending account-number order when locks are used
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    /// Returns the updated accounts in the order they were first touched.
    async fn post(&self, postings: Vec<Transaction>) -> Result<Vec<Account>, StoreError>;

    /// Journal for one account, oldest first.
    async fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError>;
}

/// Transfer intent records. Records are never deleted.
#[async_trait::async_trait]
pub trait TransferStore: Send + Sync {
    async fn create_transfer(&self, transfer: &Transfer) -> Result<TransferId, StoreError>;

    /// Persist the state, success flag and `updated_at` of an existing record.
    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), StoreError>;

    async fn transfer_by_id(&self, transfer_id: TransferId) -> Result<Transfer, StoreError>;
}

/// Currency-pair rates with inclusive validity windows.
///
/// Overlapping windows are accepted. When several rows cover `at`, the most
/// recently created one is returned.
#[async_trait::async_trait]
pub trait RateStore: Send + Sync {
    async fn create_rate(&self, rate: &ExchangeRate) -> Result<ExchangeRateId, StoreError>;

    async fn rate_at(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> Result<ExchangeRate, StoreError>;
}

/// Every capability the ledger needs, for callers that want a single handle
/// (e.g. `Arc<dyn LedgerStore>`).
pub trait LedgerStore: AccountStore + TransactionStore + TransferStore + RateStore {}

impl<T> LedgerStore for T where T: AccountStore + TransactionStore + TransferStore + RateStore + ?Sized {}

#[async_trait::async_trait]
impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    async fn open_account(&self, account: Account) -> Result<Account, StoreError> {
        (**self).open_account(account).await
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
        (**self).account_by_number(account_number).await
    }
}

#[async_trait::async_trait]
impl<S> TransactionStore for Arc<S>
where
    S: TransactionStore + ?Sized,
{
    async fn post(&self, postings: Vec<Transaction>) -> Result<Vec<Account>, StoreError> {
        (**self).post(postings).await
    }

    async fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError> {
        (**self).transactions_for(account_id).await
    }
}

#[async_trait::async_trait]
impl<S> TransferStore for Arc<S>
where
    S: TransferStore + ?Sized,
{
    async fn create_transfer(&self, transfer: &Transfer) -> Result<TransferId, StoreError> {
        (**self).create_transfer(transfer).await
    }

    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        (**self).update_transfer(transfer).await
    }

    async fn transfer_by_id(&self, transfer_id: TransferId) -> Result<Transfer, StoreError> {
        (**self).transfer_by_id(transfer_id).await
    }
}

#[async_trait::async_trait]
impl<S> RateStore for Arc<S>
where
    S: RateStore + ?Sized,
{
    async fn create_rate(&self, rate: &ExchangeRate) -> Result<ExchangeRateId, StoreError> {
        (**self).create_rate(rate).await
    }

    async fn rate_at(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> Result<ExchangeRate, StoreError> {
        (**self).rate_at(pair, at).await
    }
}
