use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use bankstream_banking::{Account, CurrencyPair, ExchangeRate, Transaction, Transfer};
use bankstream_core::{AccountId, ExchangeRateId, LedgerError, TransferId};

use super::r#trait::{AccountStore, RateStore, StoreError, TransactionStore, TransferStore};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    numbers_by_id: HashMap<AccountId, String>,
    journal: Vec<Transaction>,
    transfers: HashMap<TransferId, Transfer>,
    rates: Vec<ExchangeRate>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Every check-and-write runs under one write lock, so
/// postings on the same account can never interleave.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn open_account(&self, account: Account) -> Result<Account, StoreError> {
        let mut state = self.write()?;
        if state.accounts.contains_key(&account.account_number) {
            return Err(StoreError::Conflict(format!(
                "account number {} already exists",
                account.account_number
            )));
        }
        state
            .numbers_by_id
            .insert(account.id, account.account_number.clone());
        state
            .accounts
            .insert(account.account_number.clone(), account.clone());
        Ok(account)
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
        let state = self.read()?;
        state
            .accounts
            .get(account_number)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {account_number}")))
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryLedgerStore {
    async fn post(&self, postings: Vec<Transaction>) -> Result<Vec<Account>, StoreError> {
        if postings.is_empty() {
            return Ok(vec![]);
        }

        let mut state = self.write()?;

        // Apply to scratch copies first; state is only touched once every posting succeeded.
        let mut touched: Vec<Account> = Vec::new();
        for tx in &postings {
            let idx = match touched.iter().position(|a| a.id == tx.account_id) {
                Some(idx) => idx,
                None => {
                    let number = state.numbers_by_id.get(&tx.account_id).ok_or_else(|| {
                        StoreError::NotFound(format!("account id {}", tx.account_id))
                    })?;
                    let account = state
                        .accounts
                        .get(number)
                        .cloned()
                        .ok_or_else(|| StoreError::NotFound(format!("account {number}")))?;
                    touched.push(account);
                    touched.len() - 1
                }
            };
            touched[idx].apply(tx).map_err(|e| match e {
                LedgerError::InsufficientFunds {
                    account_number,
                    balance,
                    requested,
                } => StoreError::InsufficientFunds {
                    account_number,
                    balance,
                    requested,
                },
                other => StoreError::Backend(other.to_string()),
            })?;
        }

        for account in &touched {
            state
                .accounts
                .insert(account.account_number.clone(), account.clone());
        }
        state.journal.extend(postings);

        Ok(touched)
    }

    async fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError> {
        let state = self.read()?;
        Ok(state
            .journal
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl TransferStore for InMemoryLedgerStore {
    async fn create_transfer(&self, transfer: &Transfer) -> Result<TransferId, StoreError> {
        let mut state = self.write()?;
        if state.transfers.contains_key(&transfer.id) {
            return Err(StoreError::Conflict(format!("transfer {} already exists", transfer.id)));
        }
        state.transfers.insert(transfer.id, transfer.clone());
        Ok(transfer.id)
    }

    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let existing = state
            .transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer {}", transfer.id)))?;
        existing.state = transfer.state;
        existing.success = transfer.success;
        existing.updated_at = transfer.updated_at;
        Ok(())
    }

    async fn transfer_by_id(&self, transfer_id: TransferId) -> Result<Transfer, StoreError> {
        let state = self.read()?;
        state
            .transfers
            .get(&transfer_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transfer {transfer_id}")))
    }
}

#[async_trait::async_trait]
impl RateStore for InMemoryLedgerStore {
    async fn create_rate(&self, rate: &ExchangeRate) -> Result<ExchangeRateId, StoreError> {
        let mut state = self.write()?;
        state.rates.push(rate.clone());
        Ok(rate.id)
    }

    async fn rate_at(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> Result<ExchangeRate, StoreError> {
        let state = self.read()?;
        state
            .rates
            .iter()
            .filter(|r| r.applies_to(pair, at))
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("rate {pair} at {at}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankstream_banking::{TransactionType, ValidityWindow};
    use rust_decimal::Decimal;

    async fn open(store: &InMemoryLedgerStore, number: &str, balance: i64) -> Account {
        store
            .open_account(Account::open(number, Decimal::from(balance), "USD", Utc::now()).unwrap())
            .await
            .unwrap()
    }

    fn posting(account: &Account, kind: TransactionType, amount: i64) -> Transaction {
        Transaction::new(account.id, kind, Decimal::from(amount), Utc::now(), "", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn duplicate_account_number_conflicts() {
        let store = InMemoryLedgerStore::new();
        open(&store, "ACC-1", 0).await;
        let err = store
            .open_account(Account::open("ACC-1", Decimal::ZERO, "USD", Utc::now()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn post_is_all_or_nothing() {
        let store = InMemoryLedgerStore::new();
        let a = open(&store, "A", 10).await;
        let b = open(&store, "B", 0).await;

        // Second leg drives A negative, so the first (IN on B) must not stick either.
        let err = store
            .post(vec![
                posting(&b, TransactionType::In, 50),
                posting(&a, TransactionType::Out, 50),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));

        assert_eq!(store.account_by_number("A").await.unwrap().balance, Decimal::from(10));
        assert_eq!(store.account_by_number("B").await.unwrap().balance, Decimal::ZERO);
        assert!(store.transactions_for(a.id).await.unwrap().is_empty());
        assert!(store.transactions_for(b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_applies_every_leg_and_journals_it() {
        let store = InMemoryLedgerStore::new();
        let a = open(&store, "A", 100).await;
        let b = open(&store, "B", 50).await;

        let updated = store
            .post(vec![
                posting(&a, TransactionType::Out, 30),
                posting(&b, TransactionType::In, 30),
            ])
            .await
            .unwrap();

        assert_eq!(updated[0].balance, Decimal::from(70));
        assert_eq!(updated[1].balance, Decimal::from(80));
        assert_eq!(store.transactions_for(a.id).await.unwrap().len(), 1);
        assert_eq!(store.transactions_for(b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn posting_to_unknown_account_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let ghost = Account::open("GHOST", Decimal::ZERO, "USD", Utc::now()).unwrap();
        let err = store
            .post(vec![posting(&ghost, TransactionType::In, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn newest_overlapping_rate_wins() {
        let store = InMemoryLedgerStore::new();
        let pair = CurrencyPair::new("USD", "IDR").unwrap();
        let now = Utc::now();
        let window = ValidityWindow::new(now - chrono::Duration::seconds(10), now + chrono::Duration::seconds(10)).unwrap();

        let older = ExchangeRate::new(pair.clone(), 2000.0, window, now - chrono::Duration::seconds(1)).unwrap();
        let newer = ExchangeRate::new(pair.clone(), 2100.0, window, now).unwrap();
        store.create_rate(&newer).await.unwrap();
        store.create_rate(&older).await.unwrap();

        assert_eq!(store.rate_at(&pair, now).await.unwrap().rate, 2100.0);
        assert!(matches!(
            store.rate_at(&pair, now + chrono::Duration::seconds(11)).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_transfer_requires_existing_record() {
        let store = InMemoryLedgerStore::new();
        let a = open(&store, "A", 100).await;
        let b = open(&store, "B", 0).await;
        let request = bankstream_banking::TransferRequest {
            from_account_number: "A".into(),
            to_account_number: "B".into(),
            currency: "USD".into(),
            amount: Decimal::from(1),
        };
        let transfer = Transfer::initiate(&a, &b, &request, Utc::now());
        assert!(matches!(
            store.update_transfer(&transfer).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
