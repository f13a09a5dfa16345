use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use bankstream_banking::{Account, Transaction, TransactionSummary, TransactionType, validate_amount};
use bankstream_core::{LedgerError, LedgerResult};

use super::store_failure;
use crate::store::{AccountStore, StoreError, TransactionStore};

/// Balance snapshot of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub as_of: DateTime<Utc>,
}

/// Single-account posting input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: Decimal,
    pub kind: TransactionType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

impl NewTransaction {
    /// Checks that need no account lookup.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.kind == TransactionType::Unknown {
            return Err(LedgerError::UnknownTransactionType(self.kind.to_string()));
        }
        validate_amount(self.amount, "amount")
    }
}

/// Balance reads, single-account postings and summary aggregation.
#[derive(Debug, Clone)]
pub struct BalanceService<S> {
    store: S,
}

impl<S> BalanceService<S>
where
    S: AccountStore + TransactionStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn get_balance(&self, account_number: &str) -> LedgerResult<Balance> {
        let account = self.account(account_number).await?;
        Ok(Balance {
            account_number: account.account_number,
            amount: account.balance,
            currency: account.currency,
            as_of: Utc::now(),
        })
    }

    /// Append one transaction and apply it to the balance as a single unit.
    ///
    /// Returns the journaled transaction.
    #[instrument(skip(self, new), fields(kind = %new.kind, amount = %new.amount), err)]
    pub async fn post_transaction(&self, account_number: &str, new: NewTransaction) -> LedgerResult<Transaction> {
        new.validate()?;

        let account = self.account(account_number).await?;
        let tx = Transaction::new(account.id, new.kind, new.amount, new.occurred_at, new.notes, Utc::now())?;

        // Early rejection; the store re-checks inside its atomic unit.
        account.ensure_can_post(&tx)?;

        self.store.post(vec![tx.clone()]).await.map_err(|e| match e {
            StoreError::NotFound(_) => LedgerError::AccountNotFound {
                account_number: account_number.to_string(),
            },
            other => store_failure(format!("post_transaction({account_number})"), other),
        })?;

        debug!(account_number, transaction_id = %tx.id, "transaction posted");
        Ok(tx)
    }

    /// Fold one posted transaction into a running summary.
    pub fn summarize(&self, summary: &mut TransactionSummary, tx: &Transaction) -> LedgerResult<()> {
        summary.fold_transaction(tx)
    }

    #[instrument(skip(self), err)]
    pub async fn open_account(
        &self,
        account_number: &str,
        opening_balance: Decimal,
        currency: &str,
    ) -> LedgerResult<Account> {
        let account = Account::open(account_number, opening_balance, currency, Utc::now())?;
        self.store
            .open_account(account)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => LedgerError::AccountExists {
                    account_number: account_number.to_string(),
                },
                other => store_failure(format!("open_account({account_number})"), other),
            })
    }

    /// Journal of one account, oldest first.
    pub async fn transactions(&self, account_number: &str) -> LedgerResult<Vec<Transaction>> {
        let account = self.account(account_number).await?;
        self.store
            .transactions_for(account.id)
            .await
            .map_err(|e| store_failure(format!("transactions({account_number})"), e))
    }

    async fn account(&self, account_number: &str) -> LedgerResult<Account> {
        self.store
            .account_by_number(account_number)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => LedgerError::AccountNotFound {
                    account_number: account_number.to_string(),
                },
                other => store_failure(format!("account_by_number({account_number})"), other),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::InMemoryLedgerStore;

    fn service() -> BalanceService<Arc<InMemoryLedgerStore>> {
        BalanceService::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn posting(kind: TransactionType, amount: i64) -> NewTransaction {
        NewTransaction {
            amount: Decimal::from(amount),
            kind,
            occurred_at: Utc::now(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn unknown_account_is_reported() {
        let err = service().get_balance("NOPE").await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::AccountNotFound {
                account_number: "NOPE".into()
            }
        );
    }

    #[tokio::test]
    async fn posting_updates_balance_and_journal() {
        let svc = service();
        svc.open_account("ACC-1", Decimal::from(100), "USD").await.unwrap();

        svc.post_transaction("ACC-1", posting(TransactionType::In, 40)).await.unwrap();
        svc.post_transaction("ACC-1", posting(TransactionType::Out, 15)).await.unwrap();

        assert_eq!(svc.get_balance("ACC-1").await.unwrap().amount, Decimal::from(125));
        assert_eq!(svc.transactions("ACC-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_and_nothing_is_journaled() {
        let svc = service();
        svc.open_account("ACC-1", Decimal::from(10), "USD").await.unwrap();

        let err = svc
            .post_transaction("ACC-1", posting(TransactionType::Out, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(svc.get_balance("ACC-1").await.unwrap().amount, Decimal::from(10));
        assert!(svc.transactions("ACC-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_lookup() {
        let svc = service();
        assert!(matches!(
            svc.post_transaction("NOPE", posting(TransactionType::In, 0)).await,
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            svc.post_transaction("NOPE", posting(TransactionType::Unknown, 5)).await,
            Err(LedgerError::UnknownTransactionType(_))
        ));
    }

    #[tokio::test]
    async fn amount_beyond_stored_scale_is_rejected_untouched() {
        let svc = service();
        svc.open_account("ACC-1", Decimal::from(10), "USD").await.unwrap();

        let mut tiny = posting(TransactionType::In, 0);
        tiny.amount = Decimal::new(1, 5);
        assert!(matches!(
            svc.post_transaction("ACC-1", tiny).await,
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert_eq!(svc.get_balance("ACC-1").await.unwrap().amount, Decimal::from(10));
        assert!(svc.transactions("ACC-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_of_posted_transactions() {
        let svc = service();
        svc.open_account("ACC-1", Decimal::from(100), "USD").await.unwrap();

        let mut summary = TransactionSummary::new(Utc::now());
        for p in [posting(TransactionType::In, 40), posting(TransactionType::Out, 15)] {
            let tx = svc.post_transaction("ACC-1", p).await.unwrap();
            svc.summarize(&mut summary, &tx).unwrap();
        }

        assert_eq!(summary.sum_in, Decimal::from(40));
        assert_eq!(summary.sum_out, Decimal::from(15));
        assert_eq!(summary.sum_total, Decimal::from(25));
    }

    #[tokio::test]
    async fn opening_a_taken_number_reports_account_exists() {
        let svc = service();
        svc.open_account("ACC-1", Decimal::ZERO, "USD").await.unwrap();
        let err = svc.open_account("ACC-1", Decimal::ZERO, "USD").await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::AccountExists {
                account_number: "ACC-1".into()
            }
        );
    }
}
